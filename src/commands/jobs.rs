use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::{Context, Result};

use jobscout::config::Config;
use jobscout::export::{write_json_lines, Exporter, JsonLinesExporter};
use jobscout::utils::truncate_text;

use super::open_repository;

pub fn list_unseen(config: &Config, limit: usize) -> Result<()> {
    let repo = open_repository(config)?;
    let jobs = repo.unseen(Some(limit)).context("Failed to query unseen jobs")?;

    if jobs.is_empty() {
        println!("No unseen jobs.");
        return Ok(());
    }

    println!("Unseen jobs ({})", jobs.len());
    println!("========================================");
    for job in &jobs {
        println!(
            "[{:>3}] {} @ {} ({})",
            job.score,
            truncate_text(&job.listing.title, 60),
            job.listing.company,
            job.listing.source
        );
        println!(
            "      {} | first seen {}",
            job.listing.url,
            job.first_seen_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

/// Export unseen jobs; does not mark them notified
pub fn export_unseen(config: &Config, limit: Option<usize>, output: Option<PathBuf>) -> Result<()> {
    let repo = open_repository(config)?;
    let jobs = repo.unseen(limit).context("Failed to query unseen jobs")?;

    match output {
        Some(path) => {
            let written = JsonLinesExporter::new(&path)
                .export(&jobs)
                .context("Export failed")?;
            println!("Exported {written} jobs to {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut writer = BufWriter::new(stdout.lock());
            write_json_lines(&jobs, &mut writer).context("Failed to write to stdout")?;
        }
    }
    Ok(())
}

pub fn history(config: &Config, limit: usize) -> Result<()> {
    let repo = open_repository(config)?;
    let runs = repo.recent_runs(limit).context("Failed to query run log")?;

    if runs.is_empty() {
        println!("No runs recorded yet.");
        return Ok(());
    }

    println!(
        "{:<20} {:<10} {:<5} {:>5} {:>5}  status",
        "started", "trigger", "mode", "new", "dup"
    );
    for run in &runs {
        println!(
            "{:<20} {:<10} {:<5} {:>5} {:>5}  {}",
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.trigger,
            run.mode,
            run.new_jobs,
            run.duplicates,
            run.status
        );
    }
    Ok(())
}
