//! CLI command implementations

use std::path::{Path, PathBuf};

use graft_core::{clear_cache, load_state, save_state};
use graft_linker::{Linker, LinkerConfig};

/// Generation directory a build is written to: `<base>/build-<n>`.
fn generation_dir(base: &Path, generation: u64) -> PathBuf {
    base.join(format!("build-{generation}"))
}

pub async fn link(config_path: &Path, out: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let config = LinkerConfig::load(config_path)?;
    let root = config.root.clone();
    let base = out.unwrap_or_else(|| config.output.clone());

    let state = load_state(&root)?;
    let generation = state.as_ref().map_or(0, |s| s.generation) + 1;

    let mut linker = Linker::from_config(&config)?;
    if let Some(state) = state {
        linker = linker.with_state(state);
    }

    let output_dir = generation_dir(&base, generation);
    if output_dir.exists() {
        std::fs::remove_dir_all(&output_dir)?;
    }
    let report = linker.build(&output_dir).await?;

    let mut state = linker.build_state();
    state.generation = generation;
    save_state(&state, &root)?;

    // The build just replaced stays around for files reused from it.
    if let Some(stale) = generation.checked_sub(2).map(|g| generation_dir(&base, g)) {
        if stale.exists() {
            tracing::debug!("Removing {}", stale.display());
            std::fs::remove_dir_all(&stale)?;
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        tracing::info!(
            "Build {} written to {} ({} dirty, {} carried forward, {} files)",
            generation,
            report.output_dir.display(),
            report.dirty.len(),
            report.carried.len(),
            report.synced_files
        );
    }
    Ok(())
}

pub async fn status(config_path: &Path) -> anyhow::Result<()> {
    let config = LinkerConfig::load(config_path)?;
    let mut linker = Linker::from_config(&config)?;

    match load_state(&config.root)? {
        Some(state) => {
            if let Some(previous) = &state.previous {
                println!(
                    "Last build: #{} at {} ({} files)",
                    state.generation,
                    previous.output_dir.display(),
                    previous.ledger.len()
                );
            }
            linker = linker.with_state(state);
        }
        None => println!("No previous build recorded"),
    }

    let changed = linker.changed_packages().await?;
    if changed.is_empty() {
        println!("All packages up to date");
    } else {
        println!("Changed packages:");
        for package in changed {
            println!("  {package}");
        }
    }
    Ok(())
}

pub fn clear(config_path: &Path) -> anyhow::Result<()> {
    let root = if config_path.exists() {
        LinkerConfig::load(config_path)?.root
    } else {
        PathBuf::from(".")
    };
    tracing::info!("Clearing cache for: {}", root.display());

    clear_cache(&root)?;

    tracing::info!("Cache cleared");
    Ok(())
}
