use anyhow::{Context, Result};

use jobscout::config::Config;
use jobscout::models::{SearchTerm, TermKind};

use super::open_repository;

pub fn add(config: &Config, kind: TermKind, text: &str, weight: Option<f64>) -> Result<()> {
    let text = text.trim();
    if text.is_empty() {
        anyhow::bail!("{} must not be empty", kind.as_str());
    }
    if let Some(w) = weight {
        if !w.is_finite() || w < 0.0 {
            anyhow::bail!("weight must be a non-negative number");
        }
    }

    let term = SearchTerm {
        text: text.to_string(),
        weight,
    };
    let repo = open_repository(config)?;
    let added = repo
        .add_term(kind, &term)
        .with_context(|| format!("Failed to add {}", kind.as_str()))?;

    if added {
        println!("Added {} '{text}'", kind.as_str());
    } else {
        println!("Updated {} '{text}'", kind.as_str());
    }
    Ok(())
}

pub fn remove(config: &Config, kind: TermKind, text: &str) -> Result<()> {
    let repo = open_repository(config)?;
    let removed = repo
        .remove_term(kind, text)
        .with_context(|| format!("Failed to remove {}", kind.as_str()))?;

    if removed {
        println!("Removed {} '{text}'", kind.as_str());
    } else {
        println!("No stored {} '{text}'", kind.as_str());
    }
    Ok(())
}

pub fn list(config: &Config, kind: TermKind) -> Result<()> {
    let repo = open_repository(config)?;
    let stored = repo
        .list_terms(kind)
        .with_context(|| format!("Failed to list {}s", kind.as_str()))?;

    let configured = match kind {
        TermKind::Keyword => &config.search.keywords,
        TermKind::Tag => &config.search.tags,
    };

    println!("Configured {}s:", kind.as_str());
    print_terms(configured);
    println!("Stored {}s:", kind.as_str());
    print_terms(&stored);
    Ok(())
}

fn print_terms(terms: &[SearchTerm]) {
    if terms.is_empty() {
        println!("  (none)");
    }
    for term in terms {
        match term.weight {
            Some(w) => println!("  {} (weight {w})", term.text),
            None => println!("  {}", term.text),
        }
    }
}
