use std::fmt::Write;
use std::path::Path;

use chrono::NaiveDateTime;

use crate::model::{Collection, ProgramRecord, StoredProgram, UniversityEntry};

const NOT_SPECIFIED: &str = "Not specified";
const PREVIEW_CHARS: usize = 1000;

pub fn short_time(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

/// Leading slice of scraped text shown after a successful fetch.
pub fn preview(content: &str) -> String {
    let head: String = content.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", head)
}

/// Programs whose name, description, university or pricing contains `term`,
/// ignoring case. An empty term matches everything.
pub fn filter_programs<'a>(programs: &'a [StoredProgram], term: &str) -> Vec<&'a StoredProgram> {
    let needle = term.trim().to_lowercase();
    programs
        .iter()
        .filter(|p| {
            needle.is_empty()
                || ["name", "description", "university", "pricing"]
                    .iter()
                    .any(|key| p.text(key).is_some_and(|v| v.to_lowercase().contains(&needle)))
        })
        .collect()
}

/// A freshly extracted program, numbered from 1.
pub fn render_extracted(index: usize, program: &ProgramRecord, source_url: &str) -> String {
    let field = |key: &str| program.text(key).unwrap_or(NOT_SPECIFIED);
    let mut out = String::new();
    let _ = writeln!(out, "Program {}: {}", index, program.text("name").unwrap_or("Unknown"));
    let _ = writeln!(out, "  Name:        {}", field("name"));
    let _ = writeln!(out, "  Description: {}", field("description"));
    let _ = writeln!(out, "  Eligibility: {}", field("eligibility"));
    let _ = writeln!(out, "  Duration:    {}", field("duration"));
    let _ = writeln!(out, "  Link:        {}", program.text("link").unwrap_or(source_url));
    out
}

/// A stored program with its provenance.
pub fn render_stored(program: &StoredProgram) -> String {
    let field = |key: &str| program.text(key).unwrap_or(NOT_SPECIFIED);
    let mut out = String::new();
    let _ = writeln!(out, "{} - {}", program.university, program.text("name").unwrap_or("Unknown"));
    let _ = writeln!(out, "  University:  {}", program.university);
    let _ = writeln!(out, "  Name:        {}", field("name"));
    let _ = writeln!(out, "  Description: {}", field("description"));
    let _ = writeln!(out, "  Eligibility: {}", field("eligibility"));
    let _ = writeln!(out, "  Duration:    {}", field("duration"));
    let _ = writeln!(out, "  Pricing:     {}", field("pricing"));
    let _ = writeln!(out, "  Link:        {}", field("link"));
    let _ = writeln!(out, "  Added:       {}", short_time(&program.added_at));
    out
}

/// One university line block. `recounted` is the number of stored programs
/// that actually came from this URL; it can differ from the cumulative count.
pub fn render_university(entry: &UniversityEntry, recounted: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({} programs)", entry.name, entry.programs_count);
    let _ = writeln!(out, "  URL:            {}", entry.url);
    let _ = writeln!(out, "  Programs Count: {} (stored: {})", entry.programs_count, recounted);
    let _ = writeln!(out, "  Last Scraped:   {}", short_time(&entry.scraped_at));
    out
}

/// Headline numbers plus where the data lives.
pub fn render_stats(collection: &Collection, path: &Path, size_bytes: Option<u64>) -> String {
    let last = collection
        .last_updated
        .map(|ts| ts.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "Never".to_string());

    let mut out = String::new();
    let _ = writeln!(out, "Total Programs:       {}", collection.total_programs);
    let _ = writeln!(out, "Universities Scraped: {}", collection.universities.len());
    let _ = writeln!(out, "Last Updated:         {}", last);
    let _ = writeln!(out, "Database File:        {}", path.display());
    match size_bytes {
        Some(bytes) => {
            let _ = writeln!(out, "File Size:            {:.1} KB", bytes as f64 / 1024.0);
        }
        None => {
            let _ = writeln!(out, "Status:               Database file doesn't exist yet");
        }
    }
    out
}
