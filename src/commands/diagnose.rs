use anyhow::{bail, Result};

use jobscout::config::Config;
use jobscout::crawler::SourceCheck;
use jobscout::utils::truncate_text;

use super::build_orchestrator;

const FALLBACK_KEYWORD: &str = "Software Engineer";
const FALLBACK_LOCATION: &str = "Remote";

/// One search per source, printing listing count, error kind and latency
pub async fn diagnose(
    config: &Config,
    source: Option<String>,
    keyword: Option<String>,
    location: Option<String>,
) -> Result<()> {
    let keyword = keyword
        .or_else(|| config.search.keywords.first().map(|k| k.text.clone()))
        .unwrap_or_else(|| FALLBACK_KEYWORD.to_string());
    let location = location
        .or_else(|| config.search.locations.first().cloned())
        .unwrap_or_else(|| FALLBACK_LOCATION.to_string());

    let enabled = match &source {
        Some(name) => {
            let known: Vec<&str> = config.scraper.feeds.iter().map(|f| f.name.as_str()).collect();
            if !known.contains(&name.as_str()) {
                bail!("Unknown source '{name}'. Configured sources: {}", known.join(", "));
            }
            vec![name.clone()]
        }
        None => config.scraper.enabled(),
    };

    let orchestrator = build_orchestrator(config, &enabled)?;
    if orchestrator.registry().is_empty() {
        bail!("No sources to check");
    }

    println!("Source check");
    println!("========================================");
    println!("  Keyword:  {keyword}");
    println!("  Location: {location}");
    println!();

    let checks = orchestrator.check_sources(&keyword, &location, None).await;
    for check in &checks {
        print_check(check);
    }

    let healthy = checks.iter().filter(|c| c.is_healthy()).count();
    println!();
    println!("{healthy}/{} source(s) healthy", checks.len());
    Ok(())
}

fn print_check(check: &SourceCheck) {
    let latency = format!("{:.1}s", check.latency.as_secs_f64());
    match (&check.skip, &check.error) {
        (Some(reason), _) => {
            println!("  [skip] {:<16} {reason}", check.source);
        }
        (None, Some(error)) => {
            println!(
                "  [FAIL] {:<16} {} after {} attempt(s), {latency}",
                check.source,
                check.error_kind.unwrap_or("error"),
                check.attempts
            );
            println!("         {}", truncate_text(error, 100));
        }
        (None, None) if check.listings == 0 => {
            println!("  [empty] {:<15} 0 listings, {latency}", check.source);
        }
        (None, None) => {
            println!("  [ok  ] {:<16} {} listings, {latency}", check.source, check.listings);
            for line in &check.sample {
                println!("         -> {}", truncate_text(line, 80));
            }
        }
    }
}
