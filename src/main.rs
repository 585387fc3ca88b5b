use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use card_scanner_lib::cli::Cli;

fn main() -> anyhow::Result<()> {
    // Credentials may live in .env; load before clap reads env fallbacks.
    card_scanner_lib::config::load_env();
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "card_scanner_lib=debug,card_scanner=debug"
    } else {
        "card_scanner_lib=info,card_scanner=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let summary = card_scanner_lib::run(&cli)?;
    println!(
        "Processed {} images: {} rows written, {} OCR failures, {} of {} batches failed",
        summary.images,
        summary.rows_written,
        summary.ocr_failures,
        summary.batches_failed,
        summary.batches_sent
    );
    Ok(())
}
