mod error;
mod export;
mod fetch;
mod llm;
mod model;
mod pipeline;
mod settings;
mod store;
mod text;
mod view;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Result};
use chrono::Local;
use clap::{Parser, Subcommand};

use fetch::Fetcher;
use llm::ProgramExtractor;
use pipeline::{Pipeline, RunReport};
use settings::Settings;
use store::RecordStore;

#[derive(Parser)]
#[command(
    name = "summer_scraper",
    about = "Build a database of CS/programming summer programs from university websites"
)]
struct Cli {
    /// Database file (default: ./university_programs_database.json)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape a page, extract programs with the model and add them to the database
    Run {
        /// University page, e.g. https://university.edu/summer-programs
        url: String,
        /// OpenAI API key
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
        /// Also write this run's programs as JSON and CSV into DIR
        #[arg(long, value_name = "DIR")]
        export: Option<PathBuf>,
    },
    /// List all stored programs
    Programs {
        /// Keep programs whose name, description, university or pricing contains TERM
        #[arg(short, long, value_name = "TERM")]
        search: Option<String>,
    },
    /// List scraped universities
    Universities,
    /// Show database totals and file location
    Stats,
    /// Export the full database as JSON and all programs as CSV
    Export {
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
    /// Replace the database with an empty one
    Clear {
        /// Confirm; this cannot be undone
        #[arg(long)]
        yes: bool,
    },
    /// Delete the database file
    Reset {
        /// Confirm; this cannot be undone
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    let store = RecordStore::new(cli.db.clone().unwrap_or_else(|| settings.database_path.clone()));

    let result = match cli.command {
        Commands::Run { url, api_key, export: export_dir } => {
            let extractor = ProgramExtractor::new(&settings.api_base, api_key.or(settings.api_key));
            let pipeline = Pipeline::new(Fetcher::new()?, extractor, store);
            match pipeline.run(&url).await {
                Ok(report) => print_run(&report, pipeline.store(), export_dir),
                Err(e) => {
                    if let Some(raw) = e.raw_output() {
                        println!("Raw model output:\n{}", raw);
                    }
                    Err(e.into())
                }
            }
        }
        Commands::Programs { search } => {
            let db = store.load();
            if db.programs.is_empty() {
                println!("No programs in database yet. Start scraping some universities!");
                return Ok(());
            }
            println!("All Programs in Database ({})\n", db.programs.len());
            let term = search.as_deref().unwrap_or_default();
            let shown = view::filter_programs(&db.programs, term);
            if !term.is_empty() {
                println!("Found {} programs matching '{}'\n", shown.len(), term);
            }
            for p in shown {
                println!("{}", view::render_stored(p));
            }
            Ok(())
        }
        Commands::Universities => {
            let db = store.load();
            if db.universities.is_empty() {
                println!("No universities scraped yet!");
                return Ok(());
            }
            println!("Scraped Universities\n");
            for u in &db.universities {
                println!("{}", view::render_university(u, db.programs_from(&u.url)));
            }
            Ok(())
        }
        Commands::Stats => {
            let db = store.load();
            print!("{}", view::render_stats(&db, store.path(), store.size_bytes()));
            Ok(())
        }
        Commands::Export { dir } => {
            let db = store.load();
            if db.programs.is_empty() {
                println!("Database is empty!");
                return Ok(());
            }
            for path in export::write_collection(&dir, &db, Local::now().naive_local())? {
                println!("Wrote {}", path.display());
            }
            Ok(())
        }
        Commands::Clear { yes } => {
            if !yes {
                bail!("Refusing to clear {} without --yes", store.path().display());
            }
            store.clear()?;
            println!("Database cleared!");
            Ok(())
        }
        Commands::Reset { yes } => {
            if !yes {
                bail!("Refusing to delete {} without --yes", store.path().display());
            }
            if store.reset()? {
                println!("Database file deleted from: {}", store.path().display());
            } else {
                println!("No database file to delete.");
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn print_run(report: &RunReport, store: &RecordStore, export_dir: Option<PathBuf>) -> Result<()> {
    println!("Website scraped successfully!\n");
    println!("Content preview:\n{}\n", view::preview(&report.content));

    if report.programs.is_empty() {
        println!("No computer science/programming programs found on this page. Try a more specific URL.");
        return Ok(());
    }

    println!("Found {} programs!", report.programs.len());
    if let Some(persisted) = &report.persisted {
        match &persisted.saved {
            Ok(()) => {
                println!("Added {} programs to database!", report.programs.len());
                println!(
                    "Database now contains {} total programs from {} universities",
                    persisted.collection.total_programs,
                    persisted.collection.universities.len()
                );
                println!("Saved to: {}", store.path().display());
            }
            Err(e) => println!("Failed to save to database: {}", e),
        }
    }

    println!("\nNewly Extracted Programs\n");
    for (i, program) in report.programs.iter().enumerate() {
        println!("{}", view::render_extracted(i + 1, program, &report.url));
    }

    if let Some(dir) = export_dir {
        let now = Local::now().naive_local();
        for path in export::write_run(&dir, &report.url, &report.programs, now)? {
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
