use super::resolve_config;
use afterlife_client::Preferences;
use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use std::path::PathBuf;

fn preferences_path() -> Result<PathBuf> {
    Preferences::default_path()
        .ok_or_else(|| anyhow!("cannot locate preferences: set AFTERLIFE_HOME or HOME"))
}

pub fn show(json: bool) -> Result<()> {
    let config = resolve_config()?;
    if json {
        return crate::output::print_json(&config);
    }

    let prefs = match Preferences::default_path() {
        Some(path) => Preferences::load(&path)?,
        None => Preferences::default(),
    };
    println!("{}", "Query endpoints".bold());
    for (i, endpoint) in config.query_endpoints.iter().enumerate() {
        println!("  {}. {}", i + 1, endpoint);
    }
    println!("{}", "Gateways".bold());
    for (i, gateway) in config.gateways.iter().enumerate() {
        println!("  {}. {}", i + 1, gateway);
    }
    println!(
        "{} retry delay {}ms, attempt timeout {}ms, page size {}, max pages {}",
        "→".cyan(),
        config.retry_delay_ms,
        config.attempt_timeout_ms,
        config.page_size,
        config.max_pages
    );
    match prefs.gateway_override {
        Some(gateway) => println!("{} preferred gateway {}", "→".cyan(), gateway),
        None => println!("{} no preferred gateway", "→".cyan()),
    }
    Ok(())
}

pub fn set_gateway(url: &str) -> Result<()> {
    let path = preferences_path()?;
    let mut prefs = Preferences::load(&path)?;
    prefs.set_gateway(url)?;
    prefs
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    eprintln!(
        "{} preferred gateway set to {}",
        "ok".green().bold(),
        prefs.gateway_override.unwrap_or_default()
    );
    Ok(())
}

pub fn clear_gateway() -> Result<()> {
    let path = preferences_path()?;
    let mut prefs = Preferences::load(&path)?;
    prefs.clear_gateway();
    prefs
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    eprintln!("{} preferred gateway cleared", "ok".green().bold());
    Ok(())
}
