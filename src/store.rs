use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::model::{Collection, ProgramRecord, StoredProgram, UniversityEntry, PROVENANCE_KEYS};

pub const DEFAULT_FILE_NAME: &str = "university_programs_database.json";

/// Display name for a source: scheme stripped, everything from the first `/` dropped.
pub fn university_name(url: &str) -> &str {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    rest.split('/').next().unwrap_or_default()
}

impl Collection {
    /// Append `records` scraped from `source_url`, stamping each with
    /// provenance. Existing programs are never touched.
    pub fn merge(&mut self, records: &[ProgramRecord], source_url: &str, now: NaiveDateTime) {
        let name = university_name(source_url).to_string();

        match self.universities.iter_mut().find(|u| u.url == source_url) {
            Some(entry) => {
                entry.scraped_at = now;
                entry.programs_count += records.len();
            }
            None => self.universities.push(UniversityEntry {
                name: name.clone(),
                url: source_url.to_string(),
                scraped_at: now,
                programs_count: records.len(),
            }),
        }

        for record in records {
            let mut details = record.0.clone();
            for key in PROVENANCE_KEYS {
                details.shift_remove(key);
            }
            let id = format!("{}_{}_{}", name, record.id_name(), self.programs.len());
            self.programs.push(StoredProgram {
                details,
                university: name.clone(),
                source_url: source_url.to_string(),
                added_at: now,
                id,
            });
        }

        self.last_updated = Some(now);
        self.total_programs = self.programs.len();
    }
}

/// JSON file holding the whole `Collection`. Every save rewrites the file;
/// there is no locking, so concurrent writers lose updates.
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        RecordStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the backing file, if it exists.
    pub fn size_bytes(&self) -> Option<u64> {
        fs::metadata(&self.path).ok().map(|m| m.len())
    }

    /// Load the collection. A missing or unreadable file yields an empty one.
    pub fn load(&self) -> Collection {
        if !self.path.exists() {
            info!("No database at {:?}; starting empty", self.path);
            return Collection::default();
        }

        let parsed = fs::read_to_string(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::from_str::<Collection>(&s).map_err(|e| e.to_string()));

        match parsed {
            Ok(collection) => {
                info!(
                    "Loaded {} programs from {:?}",
                    collection.programs.len(),
                    self.path
                );
                collection
            }
            Err(e) => {
                warn!("Error loading database {:?}: {}; starting empty", self.path, e);
                Collection::default()
            }
        }
    }

    /// Rewrite the file with `collection` as pretty JSON.
    pub fn save(&self, collection: &Collection) -> Result<(), PipelineError> {
        let storage = |source: io::Error| PipelineError::Storage {
            path: self.path.clone(),
            source,
        };

        let json = serde_json::to_string_pretty(collection).map_err(|e| storage(io::Error::other(e)))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(storage)?;
        }
        fs::write(&self.path, json).map_err(storage)?;

        info!(
            "Saved {} programs to {:?}",
            collection.total_programs, self.path
        );
        Ok(())
    }

    /// Load, merge `records` stamped with the current time, and save.
    /// The merged collection is returned even when saving fails.
    pub fn add_programs(
        &self,
        records: &[ProgramRecord],
        source_url: &str,
    ) -> (Collection, Result<(), PipelineError>) {
        let mut collection = self.load();
        collection.merge(records, source_url, Local::now().naive_local());
        let saved = self.save(&collection);
        (collection, saved)
    }

    /// Overwrite the file with an empty collection.
    pub fn clear(&self) -> Result<(), PipelineError> {
        self.save(&Collection::default())
    }

    /// Delete the file. Returns false when there was nothing to delete.
    pub fn reset(&self) -> Result<bool, PipelineError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(PipelineError::Storage {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
