//! `mdflow graph`: convert one document and print the result.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use mdflow_core::dag;
use mdflow_types::config::MdflowConfig;

pub fn run(config: &MdflowConfig, file: &Path, waves: bool, json: bool) -> Result<()> {
    let pipeline = crate::pipeline(config);
    let graph = pipeline
        .ingest_file(file)
        .with_context(|| format!("failed to convert {}", file.display()))?;

    if !waves {
        println!("{}", serde_json::to_string_pretty(graph.as_ref())?);
        return Ok(());
    }

    let plan: Vec<Vec<&str>> = dag::execution_waves(&graph)?
        .iter()
        .map(|wave| wave.iter().map(|s| s.id.as_str()).collect())
        .collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        for (i, wave) in plan.iter().enumerate() {
            println!("  {} {}", style(format!("wave {}:", i + 1)).bold(), wave.join(", "));
        }
    }
    for warning in &graph.warnings {
        tracing::warn!(phase = %warning.phase, step = ?warning.step, "{}", warning.message);
    }
    Ok(())
}
