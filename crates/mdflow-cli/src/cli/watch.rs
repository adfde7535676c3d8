//! `mdflow watch`: keep a live set of workflows in sync with a directory.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;
use mdflow_core::registry::{LiveWorkflowSet, RegistryEvent};
use mdflow_infra::watcher::WorkflowWatcher;
use mdflow_types::config::MdflowConfig;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

pub async fn run(config: &MdflowConfig, dir: Option<PathBuf>, json: bool) -> Result<()> {
    let directory = dir.unwrap_or_else(|| config.watch.directory.clone());
    let live = Arc::new(LiveWorkflowSet::new(
        Arc::new(crate::pipeline(config)),
        EVENT_CAPACITY,
    ));
    let mut events = live.subscribe();

    let mut watcher = WorkflowWatcher::from_config(live.clone(), &config.watch);
    let found = watcher
        .start(&directory, config.watch.recursive)
        .await
        .with_context(|| format!("failed to watch {}", directory.display()))?;

    // Each document found on start yields one registry event from the watcher task.
    let mut settled = 0;
    while settled < found {
        match events.recv().await {
            Ok(event) => {
                settled += 1;
                print_event(&event, json);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                settled = settled.saturating_add(usize::try_from(skipped).unwrap_or(usize::MAX));
                tracing::warn!(skipped, "registry event receiver lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    println!(
        "  {} {} workflow(s) loaded from {}",
        style("*").green().bold(),
        live.len(),
        style(directory.display()).cyan()
    );

    if !config.watch.auto_reload {
        watcher.stop().await;
        return Ok(());
    }

    println!("  Watching for changes, press Ctrl-C to stop.");
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                break;
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event, json),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "registry event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    watcher.stop().await;
    let stats = live.pipeline().stats();
    tracing::info!(
        parses = stats.parses,
        cache_hits = stats.cache_hits,
        parse_failures = stats.parse_failures,
        conversion_failures = stats.conversion_failures,
        "watch session finished"
    );
    Ok(())
}

fn print_event(event: &RegistryEvent, json: bool) {
    if json {
        let value = match event {
            RegistryEvent::Registered { path, hash } => {
                serde_json::json!({ "event": "registered", "path": path, "hash": hash })
            }
            RegistryEvent::Updated { path, hash } => {
                serde_json::json!({ "event": "updated", "path": path, "hash": hash })
            }
            RegistryEvent::Unregistered { path } => {
                serde_json::json!({ "event": "unregistered", "path": path })
            }
            RegistryEvent::Failed { path, error } => {
                serde_json::json!({ "event": "failed", "path": path, "error": error })
            }
        };
        println!("{value}");
        return;
    }

    match event {
        RegistryEvent::Registered { path, .. } => {
            println!("  {} {}", style("+").green().bold(), path.display());
        }
        RegistryEvent::Updated { path, .. } => {
            println!("  {} {}", style("~").yellow().bold(), path.display());
        }
        RegistryEvent::Unregistered { path } => {
            println!("  {} {}", style("-").red().bold(), path.display());
        }
        RegistryEvent::Failed { path, error } => {
            println!("  {} {}: {}", style("!").red().bold(), path.display(), style(error).red());
        }
    }
}
