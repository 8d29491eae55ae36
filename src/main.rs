//! Intraday return forecasting CLI

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use intraday_forecast::{config::Config, pipeline::PipelineContext, types::DatePredictions};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "intraday-forecast")]
#[command(about = "Predict the 09:00 → 10:30 move for every ticker with enough history")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Train, predict and upsert into the history table
    Predict {
        /// Date(s) to predict, YYYY-MM-DD; defaults to the latest available
        #[arg(short, long = "date", num_args = 1..)]
        dates: Vec<NaiveDate>,
    },
    /// Train every ticker and print the validation table
    Train,
    /// Export the engineered feature table
    Features {
        /// Output CSV path (default <output_dir>/features.csv)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Print the effective configuration
    ShowConfig,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Predict { dates } => predict(config, &dates),
        Commands::Train => train(config),
        Commands::Features { out } => features(config, out),
        Commands::ShowConfig => show_config(&config),
    }
}

fn predict(config: Config, dates: &[NaiveDate]) -> anyhow::Result<()> {
    let summary = PipelineContext::new(config).predict(dates)?;

    for result in &summary.predictions {
        match result {
            DatePredictions::NoPredictions { date } => {
                println!("\n{date}: no predictions available");
            }
            DatePredictions::Predictions { date, records } => {
                println!("\n📈 Predictions for {date}\n");
                println!(
                    "{:<8} {:>10} {:>8} {:>6} {:<4} Top drivers",
                    "Ticker", "Price", "Change", "Conf", "Flag"
                );
                println!("{}", "-".repeat(80));
                for r in records {
                    println!(
                        "{:<8} {:>10.2} {:>7.1}% {:>6.1} {:<4} {}",
                        r.ticker,
                        r.predicted_price,
                        r.predicted_change_pct * 100.0,
                        r.confidence,
                        if r.red_flag { "RED" } else { "" },
                        r.top_features.join(", ")
                    );
                }
            }
        }
    }

    if !summary.skipped.is_empty() {
        println!("\nSkipped {} ticker(s):", summary.skipped.len());
        for (ticker, reason) in &summary.skipped {
            println!("  {ticker}: {reason}");
        }
    }

    println!(
        "\n✅ {} row(s) written, {} total in {}",
        summary.rows_written,
        summary.history_rows,
        summary.history_path.display()
    );
    for path in &summary.newswire {
        println!("   newswire: {}", path.display());
    }
    Ok(())
}

fn train(config: Config) -> anyhow::Result<()> {
    let outcome = PipelineContext::new(config).train()?;

    println!("\n📊 Validation\n");
    for report in outcome.reports() {
        println!("{report}");
    }
    for (ticker, reason) in &outcome.skipped {
        println!("{ticker:<8} skipped: {reason}");
    }
    Ok(())
}

fn features(config: Config, out: Option<PathBuf>) -> anyhow::Result<()> {
    let (path, rows) = PipelineContext::new(config).export_features(out.as_deref())?;
    println!("✅ {} feature rows written to {}", rows, path.display());
    Ok(())
}

fn show_config(config: &Config) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
