use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys the record store owns; model-supplied values for these are replaced.
pub const PROVENANCE_KEYS: [&str; 4] = ["university", "source_url", "added_at", "id"];

/// One program as returned by the model. The field set is whatever the model
/// produced, so every accessor tolerates missing or non-string values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgramRecord(pub Map<String, Value>);

impl ProgramRecord {
    pub fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Name as used in record ids: strings verbatim, other values as JSON
    /// text. Absent or blank-valued names (null, "", 0, false, [], {}) read
    /// as `unknown`.
    pub fn id_name(&self) -> String {
        match self.0.get("name") {
            None | Some(Value::Null) | Some(Value::Bool(false)) => "unknown".to_string(),
            Some(Value::String(s)) if s.is_empty() => "unknown".to_string(),
            Some(Value::Array(a)) if a.is_empty() => "unknown".to_string(),
            Some(Value::Object(o)) if o.is_empty() => "unknown".to_string(),
            Some(Value::Number(n)) if n.as_f64() == Some(0.0) => "unknown".to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

/// A program after merge: the model's fields plus provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredProgram {
    #[serde(flatten)]
    pub details: Map<String, Value>,
    pub university: String,
    pub source_url: String,
    pub added_at: NaiveDateTime,
    pub id: String,
}

impl StoredProgram {
    pub fn text(&self, key: &str) -> Option<&str> {
        match key {
            "university" => Some(self.university.as_str()),
            "source_url" => Some(self.source_url.as_str()),
            "id" => Some(self.id.as_str()),
            _ => self.details.get(key).and_then(Value::as_str),
        }
    }

    /// Flat key/value view, in the same key order as the stored JSON.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = self.details.clone();
        map.insert("university".into(), Value::String(self.university.clone()));
        map.insert("source_url".into(), Value::String(self.source_url.clone()));
        map.insert("added_at".into(), Value::String(iso_timestamp(&self.added_at)));
        map.insert("id".into(), Value::String(self.id.clone()));
        map
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniversityEntry {
    pub name: String,
    pub url: String,
    pub scraped_at: NaiveDateTime,
    pub programs_count: usize,
}

/// Root of the persisted store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub programs: Vec<StoredProgram>,
    pub universities: Vec<UniversityEntry>,
    pub last_updated: Option<NaiveDateTime>,
    pub total_programs: usize,
}

impl Collection {
    /// Number of stored programs whose `source_url` is exactly `url`.
    pub fn programs_from(&self, url: &str) -> usize {
        self.programs.iter().filter(|p| p.source_url == url).count()
    }
}

/// ISO-8601 rendering matching what serde writes for `NaiveDateTime`.
pub fn iso_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}
