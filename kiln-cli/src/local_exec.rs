use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use kiln::prelude::*;
use miette::{miette, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

fn load_recipe(file: &Path, params: HashMap<String, String>) -> Result<Recipe> {
    let format = format_from_path(file);
    let recipe = Recipe::from_file(file, format, params)?;
    debug!("Loaded recipe {} with {} job(s)", file.display(), recipe.jobs.len());
    Ok(recipe)
}

pub async fn run_local(
    file: PathBuf,
    params: HashMap<String, String>,
    jobs: Vec<String>,
) -> Result<()> {
    info!("Running recipe from file: {}", file.display());

    let recipe = load_recipe(&file, params.clone())?;

    let shutdown = CancellationToken::new();
    let mut conductor = Conductor::new()
        .with_tracker(Arc::new(LoggingProgressTracker))
        .with_cancellation(shutdown.clone());

    for job in jobs_from_recipe(&recipe, &params, &jobs)? {
        conductor.register(job)?;
    }

    tokio::spawn(handle_shutdown_signals(shutdown.clone()));

    debug!("Starting jobs");
    conductor.execute().await?;

    let pending = conductor.pending_jobs();
    if !pending.is_empty() {
        if shutdown.is_cancelled() {
            return Err(miette!("run interrupted, unfinished jobs: {}", pending.join(", ")));
        }
        return Err(miette!(
            "run ended before every job reported completion: {}",
            pending.join(", ")
        ));
    }

    debug!("Recipe completed successfully");
    Ok(())
}

/// Validate the recipe and the dependencies of the selected jobs
pub fn check(file: &Path, params: HashMap<String, String>, jobs: &[String]) -> Result<Vec<String>> {
    let recipe = load_recipe(file, params.clone())?;

    let checked = jobs_from_recipe(&recipe, &params, jobs)?;
    if checked.is_empty() {
        warn!("Recipe {} declares no jobs", file.display());
    }

    Ok(checked
        .iter()
        .map(|job| {
            let mut line = format!("✅ {}: {} step(s)", job.name(), job.steps().len());
            let tools: Vec<&str> = job
                .dependencies()
                .iter()
                .map(|dependency| dependency.name.as_str())
                .collect();
            if !tools.is_empty() {
                line.push_str(&format!(", uses {}", tools.join(", ")));
            }
            line
        })
        .collect())
}

/// One line per job with its steps
pub fn list(file: &Path, params: HashMap<String, String>) -> Result<Vec<String>> {
    let recipe = load_recipe(file, params)?;

    let mut lines = Vec::new();
    for (name, definition) in recipe.jobs.iter() {
        lines.push(format!("{name} ({} step(s))", definition.steps.len()));
        for (index, step) in definition.steps.iter().enumerate() {
            let label = if step.name.is_empty() {
                step.source.as_str()
            } else {
                step.name.as_str()
            };
            lines.push(format!("  {}. [{}] {label}", index + 1, step.action));
        }
    }

    Ok(lines)
}

async fn handle_shutdown_signals(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling jobs");
        },
        _ = terminate => {
            info!("Received SIGTERM, cancelling jobs");
        },
        _ = shutdown_token.cancelled() => return,
    }

    shutdown_token.cancel();
}
