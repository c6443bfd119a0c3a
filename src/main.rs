//! # article_harvest
//!
//! Fetches news articles for one theme/keyword pair, extracts a structured
//! record from each page, and writes the records plus a report of skipped
//! URLs to a dated JSON file.
//!
//! ## Usage
//!
//! ```sh
//! article_harvest --theme supply --keyword "renewable diesel" -o ./out
//! ```

use article_harvest::cli::Cli;
use article_harvest::config::HarvestConfig;
use article_harvest::fetch::{BatchJob, HttpDocumentSource};
use article_harvest::outputs::json;
use article_harvest::pipeline::Harvester;
use article_harvest::registry::InstructionRegistry;
use article_harvest::selector::HtmlSelectorEngine;
use article_harvest::sites::SiteIdentityResolver;
use article_harvest::utils::ensure_writable_dir;
use clap::Parser;
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("article_harvest starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    // ---- Configuration ----
    let mut config = HarvestConfig::load(args.config.as_deref())?;
    if let Some(max_passes) = args.max_passes {
        config.retry.max_passes = max_passes;
    }
    if let Some(ref instructions) = args.instructions {
        config.instructions_path = Some(instructions.clone());
    }
    config.validate()?;

    // Early check: output dir must be writable before anything is fetched
    let output_dir = Path::new(&args.output_dir);
    if let Err(e) = ensure_writable_dir(output_dir).await {
        error!(
            path = %args.output_dir,
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }

    // ---- Instructions & sites ----
    let registry = match config.instructions_path {
        Some(ref path) => InstructionRegistry::from_path(path)?,
        None => InstructionRegistry::builtin()?,
    };
    let engine = HtmlSelectorEngine::new();
    let mut invalid = 0usize;
    for (publisher, query) in registry.queries() {
        if let Err(e) = engine.check(query) {
            invalid += 1;
            warn!(%publisher, error = %e, "Query will never match");
        }
    }
    info!(publishers = registry.len(), invalid, "Validated instruction queries");

    let sites = SiteIdentityResolver::builtin().with_domains(config.sites.clone());

    // ---- Harvest ----
    let source = HttpDocumentSource::new(&config.fetch)?;
    let harvester = Harvester::new(source, engine, registry, sites)
        .with_policy(config.retry.policy())
        .with_fetch_timeout(config.fetch.page_timeout());

    let job = if args.urls.is_empty() {
        BatchJob::search(args.theme, args.keyword.clone())
    } else {
        BatchJob::urls(args.theme, args.keyword.clone(), args.urls.iter().cloned())
    };
    let deadline = args
        .deadline_secs
        .map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));

    let (records, report) = match harvester.collect(&job, deadline).await {
        Ok(harvest) => harvest,
        Err(e) => {
            error!(keyword = %args.keyword, error = %e, "Harvest failed");
            return Err(e.into());
        }
    };

    for skipped in &report.batch.skipped {
        warn!(url = %skipped.url, reason = ?skipped.reason, "Skipped URL");
    }

    // ---- Output ----
    let path = json::write_report(output_dir, args.theme, &args.keyword, &records, &report).await?;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        path = %path.display(),
        records = records.len(),
        skipped = report.batch.skipped.len(),
        gaps = report.gaps.len(),
        "Execution complete"
    );

    Ok(())
}
