use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

mod dashboard;
mod db;
mod deviation;
mod logging;
mod models;
mod report;

use models::{Category, Source, Window};

const DEFAULT_CUTOFF: &str = "2025-02-24";

#[derive(Parser)]
#[command(name = "forecast-deviation")]
#[command(about = "Actual vs predicted operation counts with deviation tracking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a placeholder series for both sources, ending yesterday
    Seed {
        #[arg(long, default_value_t = 120)]
        days: i64,
    },
    /// Import daily counts from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, value_enum)]
        source: Source,
    },
    /// Deviation summary for one category over a trailing window
    Summary {
        #[arg(long, value_enum)]
        category: Category,
        #[arg(long, value_enum, default_value_t = Window::Last7)]
        window: Window,
        #[arg(long, default_value = DEFAULT_CUTOFF)]
        since: NaiveDate,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Chart series, metric cards and accuracy counts for one category, as JSON
    Panel {
        #[arg(long, value_enum)]
        category: Category,
        #[arg(long, value_enum, default_value_t = Window::Last7)]
        bar_window: Window,
        #[arg(long, value_enum, default_value_t = Window::All)]
        line_window: Window,
        #[arg(long, default_value = DEFAULT_CUTOFF)]
        since: NaiveDate,
    },
    /// Show actual vs predicted for a specific date
    Lookup {
        #[arg(long)]
        date: NaiveDate,
        #[arg(long, value_enum)]
        category: Option<Category>,
        #[arg(long, default_value = DEFAULT_CUTOFF)]
        since: NaiveDate,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = DEFAULT_CUTOFF)]
        since: NaiveDate,
        #[arg(long, value_enum, default_value_t = Window::Last7)]
        bar_window: Window,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    info!("connected to Postgres");

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed { days } => {
            let seeded = db::seed(&pool, Utc::now().date_naive(), days).await?;
            println!("Seeded {seeded} days of placeholder data.");
        }
        Commands::Import { csv, source } => {
            let upserted = db::import_csv(&pool, &csv, source).await?;
            println!("Upserted {upserted} rows from {}.", csv.display());
        }
        Commands::Summary {
            category,
            window,
            since,
            format,
        } => {
            let (actual, predicted) = db::fetch_both(&pool, since).await?;
            let merged = dashboard::merged_for(category, &actual, &predicted);
            let deviations = deviation::compute_deviation(&merged);
            let summary = deviation::summarize_window(deviation::window_slice(&deviations, window));

            match format {
                OutputFormat::Json => {
                    let output = json!({
                        "category": category,
                        "window": window,
                        "summary": summary,
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Text => {
                    println!(
                        "{} vs {} ({}):",
                        category.label(),
                        category.predicted_label(),
                        window.label()
                    );
                    for line in report::summary_lines(&summary) {
                        println!("- {line}");
                    }
                }
            }
        }
        Commands::Panel {
            category,
            bar_window,
            line_window,
            since,
        } => {
            let (actual, predicted) = db::fetch_both(&pool, since).await?;
            let panel =
                dashboard::build_panel(category, &actual, &predicted, bar_window, line_window);
            println!("{}", serde_json::to_string_pretty(&panel)?);
        }
        Commands::Lookup {
            date,
            category,
            since,
        } => {
            let (actual, predicted) = db::fetch_both(&pool, since).await?;
            let categories = match category {
                Some(category) => vec![category],
                None => Category::ALL.to_vec(),
            };

            println!("Data for {date}:");
            for category in categories {
                match dashboard::day_detail(category, &actual, &predicted, date) {
                    Ok(row) => println!(
                        "- {}: actual {} / predicted {} ({})",
                        category.label(),
                        row.actual,
                        row.predicted,
                        report::describe_deviation(&deviation::deviation_for(
                            row.actual,
                            row.predicted
                        ))
                    ),
                    Err(err) => println!("- {}: {err}.", category.label()),
                }
            }
        }
        Commands::Report {
            since,
            bar_window,
            out,
        } => {
            let (actual, predicted) = db::fetch_both(&pool, since).await?;
            let report = report::build_report(since, bar_window, &actual, &predicted);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
