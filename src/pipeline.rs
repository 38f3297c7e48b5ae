use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::error::PipelineError;
use crate::fetch::Fetcher;
use crate::llm::ProgramExtractor;
use crate::model::{Collection, ProgramRecord};
use crate::store::RecordStore;
use crate::text;

/// Outcome of storing a non-empty batch. The merged collection is kept even
/// if the write failed so the results can still be exported.
#[derive(Debug)]
pub struct Persisted {
    pub collection: Collection,
    pub saved: Result<(), PipelineError>,
}

#[derive(Debug)]
pub struct RunReport {
    pub url: String,
    pub content: String,
    pub programs: Vec<ProgramRecord>,
    /// `None` when the model found no programs and the store was left alone.
    pub persisted: Option<Persisted>,
}

/// Fetch → text → model → store, one URL at a time.
pub struct Pipeline {
    fetcher: Fetcher,
    extractor: ProgramExtractor,
    store: RecordStore,
}

impl Pipeline {
    pub fn new(fetcher: Fetcher, extractor: ProgramExtractor, store: RecordStore) -> Self {
        Pipeline {
            fetcher,
            extractor,
            store,
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub async fn run(&self, url: &str) -> Result<RunReport, PipelineError> {
        if !self.extractor.has_credential() {
            return Err(PipelineError::MissingCredential);
        }

        let pb = spinner("Scraping website...");
        let fetched = self.fetcher.fetch(url).await;
        pb.finish_and_clear();
        let page = fetched?;
        let content = text::extract_text(&page.body, page.charset.as_deref());
        info!("Extracted {} chars of text from {}", content.chars().count(), url);

        let pb = spinner("Extracting programs with AI...");
        let extracted = self.extractor.extract(&content, url).await;
        pb.finish_and_clear();
        let programs = extracted?;

        let persisted = if programs.is_empty() {
            info!("No programs found at {}", url);
            None
        } else {
            let pb = spinner("Saving to database...");
            let (collection, saved) = self.store.add_programs(&programs, url);
            pb.finish_and_clear();
            Some(Persisted { collection, saved })
        };

        Ok(RunReport {
            url: url.to_string(),
            content,
            programs,
            persisted,
        })
    }
}

fn spinner(msg: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
