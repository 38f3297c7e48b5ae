use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::model::{Collection, ProgramRecord};

const SEP: char = ',';

/// Results of a single run, as offered for download right after scraping.
#[derive(Debug, Serialize)]
pub struct RunExport<'a> {
    pub source_url: &'a str,
    pub exported_at: NaiveDateTime,
    pub total_programs: usize,
    pub programs: &'a [ProgramRecord],
}

impl<'a> RunExport<'a> {
    pub fn new(source_url: &'a str, programs: &'a [ProgramRecord], now: NaiveDateTime) -> Self {
        RunExport {
            source_url,
            exported_at: now,
            total_programs: programs.len(),
            programs,
        }
    }
}

pub fn file_stamp(now: NaiveDateTime) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

// ── CSV ──

fn needs_quotes(field: &str) -> bool {
    field.contains(SEP) || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn write_row<W: Write>(mut w: W, row: &[String]) -> io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            write!(w, "{}", SEP)?;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{}", cell)?;
        }
    }
    writeln!(w)
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Columns are the union of all keys, in first-seen order.
pub fn columns(rows: &[Map<String, Value>]) -> Vec<String> {
    let mut cols: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !cols.contains(key) {
                cols.push(key.clone());
            }
        }
    }
    cols
}

/// One header line plus one line per record.
pub fn to_csv(rows: &[Map<String, Value>]) -> io::Result<String> {
    let cols = columns(rows);
    let mut buf: Vec<u8> = Vec::new();
    write_row(&mut buf, &cols)?;
    for row in rows {
        let cells: Vec<String> = cols.iter().map(|c| cell(row.get(c))).collect();
        write_row(&mut buf, &cells)?;
    }
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

// ── Files ──

fn write_file(dir: &Path, name: &str, contents: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    let path = dir.join(name);
    fs::write(&path, contents).with_context(|| format!("Failed to write {:?}", path))?;
    info!("Wrote {:?}", path);
    Ok(path)
}

/// Write `summer_programs_<stamp>.json` and, when there are programs, `.csv`.
pub fn write_run(dir: &Path, source_url: &str, programs: &[ProgramRecord], now: NaiveDateTime) -> Result<Vec<PathBuf>> {
    let stamp = file_stamp(now);
    let doc = RunExport::new(source_url, programs, now);
    let mut written = vec![write_file(
        dir,
        &format!("summer_programs_{stamp}.json"),
        &serde_json::to_string_pretty(&doc)?,
    )?];

    if !programs.is_empty() {
        let rows: Vec<Map<String, Value>> = programs.iter().map(|p| p.0.clone()).collect();
        written.push(write_file(dir, &format!("summer_programs_{stamp}.csv"), &to_csv(&rows)?)?);
    }
    Ok(written)
}

/// Write the whole collection as JSON plus every program as CSV.
pub fn write_collection(dir: &Path, collection: &Collection, now: NaiveDateTime) -> Result<Vec<PathBuf>> {
    let stamp = file_stamp(now);
    let rows: Vec<Map<String, Value>> = collection.programs.iter().map(|p| p.to_map()).collect();
    Ok(vec![
        write_file(
            dir,
            &format!("full_database_{stamp}.json"),
            &serde_json::to_string_pretty(collection)?,
        )?,
        write_file(dir, &format!("all_programs_{stamp}.csv"), &to_csv(&rows)?)?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, 2).unwrap().and_hms_opt(8, 5, 9).unwrap()
    }

    fn maps(v: Value) -> Vec<Map<String, Value>> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn columns_union_in_first_seen_order() {
        let rows = maps(json!([
            {"name": "A", "duration": "2w"},
            {"name": "B", "pricing": "Free", "duration": "1w"}
        ]));
        assert_eq!(columns(&rows), ["name", "duration", "pricing"]);
        assert_eq!(to_csv(&rows).unwrap(), "name,duration,pricing\nA,2w,\nB,1w,Free\n");
    }

    #[test]
    fn quoting_and_non_string_values() {
        let rows = maps(json!([
            {"name": "Code, Create", "description": "Say \"hi\"\nthen code", "weeks": 4, "link": null}
        ]));
        assert_eq!(
            to_csv(&rows).unwrap(),
            "name,description,weeks,link\n\"Code, Create\",\"Say \"\"hi\"\"\nthen code\",4,\n"
        );
    }

    #[test]
    fn empty_rows_give_blank_header() {
        assert_eq!(to_csv(&[]).unwrap(), "\n");
    }

    #[test]
    fn run_document_shape() {
        let programs: Vec<ProgramRecord> = serde_json::from_value(json!([{"name": "A"}])).unwrap();
        let v = serde_json::to_value(RunExport::new("https://a.edu", &programs, now())).unwrap();
        assert_eq!(
            v,
            json!({
                "source_url": "https://a.edu",
                "exported_at": "2024-07-02T08:05:09",
                "total_programs": 1,
                "programs": [{"name": "A"}]
            })
        );
    }

    #[test]
    fn writes_run_files() {
        let dir = tempfile::tempdir().unwrap();
        let programs: Vec<ProgramRecord> = serde_json::from_value(json!([{"name": "A"}])).unwrap();
        let written = write_run(dir.path(), "https://a.edu", &programs, now()).unwrap();

        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["summer_programs_20240702_080509.json", "summer_programs_20240702_080509.csv"]);
        assert_eq!(fs::read_to_string(&written[1]).unwrap(), "name\nA\n");

        let empty = write_run(dir.path(), "https://a.edu", &[], now()).unwrap();
        assert_eq!(empty.len(), 1);
    }

    #[test]
    fn writes_collection_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Collection::default();
        let programs: Vec<ProgramRecord> =
            serde_json::from_value(json!([{"name": "Código", "pricing": "Free"}])).unwrap();
        db.merge(&programs, "https://uni.es/verano", now());

        let written = write_collection(dir.path(), &db, now()).unwrap();
        let full = fs::read_to_string(&written[0]).unwrap();
        assert!(full.contains("Código"));
        let reloaded: Collection = serde_json::from_str(&full).unwrap();
        assert_eq!(reloaded, db);

        let csv = fs::read_to_string(&written[1]).unwrap();
        assert_eq!(
            csv,
            "name,pricing,university,source_url,added_at,id\n\
             Código,Free,uni.es,https://uni.es/verano,2024-07-02T08:05:09,uni.es_Código_0\n"
        );
    }
}
