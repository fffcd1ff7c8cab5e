//! # Bourse Digest
//!
//! Daily digest of Casablanca Stock Exchange news, posted to a Telegram
//! channel.
//!
//! ## Usage
//!
//! ```sh
//! BOT_TOKEN=... CHAT_ID=@bourse GEMINI_API_KEY=... bourse_digest -r ./reports
//! ```
//!
//! ## Architecture
//!
//! One run is a straight pipeline:
//! 1. **Fetching**: sweep each configured source page by page
//! 2. **Classifying**: keep candidates dated inside the window and relevant to the exchange
//! 3. **Ranking**: assign an importance tier and sort, stable within a tier
//! 4. **Aggregating**: group articles about the same company
//! 5. **Formatting**: ask Gemini for a narrative, or fall back to a fixed template
//! 6. **Delivery**: post the digest, splitting it under Telegram's size limit
//!
//! Failures inside a stage degrade the run instead of stopping it. Anything
//! that escapes is reported to the channel as a warning before exiting.

use chrono::Local;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod aggregator;
mod classifier;
mod cli;
mod config;
mod dates;
mod delivery;
mod digest;
mod error;
mod generator;
mod lexicon;
mod models;
mod outputs;
mod pipeline;
mod ranker;
mod scrapers;
mod utils;

use cli::Cli;
use config::{Credentials, Settings};
use delivery::{DeliveryHints, DeliverySink, TelegramSink};
use generator::GeminiGenerator;
use outputs::json;
use pipeline::Pipeline;
use utils::{ensure_writable_dir, truncate_for_log};

/// Best-effort warning to the channel about a failed run.
async fn notify_failure<S: DeliverySink>(sink: &S, err: &dyn Error, hints: DeliveryHints) {
    let text = format!("⚠️ Échec du résumé boursier: {err}");
    if !sink.deliver(&text, hints).await {
        error!("Could not deliver the failure notice either");
    }
}

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
    info!("bourse_digest starting up");

    let args = Cli::parse();
    debug!(config = ?args.config, report_dir = ?args.report_dir, dry_run = args.dry_run, "Parsed CLI arguments");

    // ---- Configuration: all of it is checked before any network call ----
    let mut settings = Settings::load(args.config.as_deref())?;
    settings.apply_cli(&args);
    settings.validate()?;
    let credentials = Credentials::from_cli(&args).inspect_err(|e| {
        error!(error = %e, "Cannot start without credentials");
    })?;
    info!(
        window_days = settings.window_days,
        language = %settings.language,
        sources = settings.sources.len(),
        entities = settings.lexicons.entities.terms().len(),
        max_pages = settings.max_pages,
        "Settings ready"
    );

    if let Some(dir) = &args.report_dir {
        if let Err(e) = ensure_writable_dir(dir).await {
            warn!(path = %dir, error = %e, "Report directory is not writable; the run report will be lost");
        }
    }

    let sink = TelegramSink::new(&settings.delivery, &credentials)?;
    let hints = DeliveryHints {
        disable_preview: settings.delivery.disable_preview,
    };

    // ---- Run ----
    let generator = match GeminiGenerator::new(&settings.generator, &credentials) {
        Ok(generator) => generator,
        Err(e) => {
            error!(error = %e, "Could not build the generator client");
            notify_failure(&sink, &e, hints).await;
            return Err(e.into());
        }
    };
    let pipeline = match Pipeline::new(&settings) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %e, "Could not build the page fetcher");
            notify_failure(&sink, &e, hints).await;
            return Err(e.into());
        }
    };

    let today = Local::now().date_naive();
    let (digest, report) = match pipeline.run_guarded(today, &generator).await {
        Ok(outcome) => outcome,
        Err(e) => {
            notify_failure(&sink, &e, hints).await;
            return Err(e.into());
        }
    };
    info!(
        kind = ?digest.kind(),
        articles = report.articles.len(),
        groups = report.groups.len(),
        generator_degraded = report.generator_degraded,
        preview = %truncate_for_log(digest.text(), 200),
        "Digest ready"
    );

    // ---- Delivery ----
    let delivered = if args.dry_run {
        println!("{}", digest.text());
        false
    } else {
        sink.deliver(digest.text(), hints).await
    };
    if !args.dry_run && !delivered {
        warn!("Digest was not delivered");
    }

    // ---- Report ----
    if let Some(dir) = &args.report_dir {
        if let Err(e) = json::write_report(&report, &digest, delivered, dir).await {
            error!(error = %e, "Failed to write run report");
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
