use anyhow::Context;
use chrono::{Datelike, Duration, NaiveDate};
use sqlx::{PgPool, Row};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{DailyCounts, Source};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("line {line}: {column} must be a finite, non-negative count (got {value})")]
    InvalidCount {
        line: usize,
        column: &'static str,
        value: f64,
    },
}

fn table(source: Source) -> (&'static str, &'static str) {
    match source {
        Source::Actual => ("forecast_deviation.actual_counts", "visit_date"),
        Source::Predicted => ("forecast_deviation.predicted_counts", "forecast_date"),
    }
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Deterministic stand-in counts for one day, used when no live feed exists.
pub fn placeholder_counts(date: NaiveDate, source: Source) -> DailyCounts {
    const DRIFT: [f64; 7] = [-0.12, -0.06, 0.0, 0.04, 0.09, 0.15, -0.03];

    let weekday = date.weekday().num_days_from_monday() as usize;
    let load = if weekday == 6 { 0.4 } else { 1.0 + weekday as f64 * 0.05 };
    let actual = DailyCounts {
        date,
        pay_new: (120.0 * load).round(),
        pay_review: (340.0 * load).round(),
        free_new: (60.0 * load).round(),
        free_review: if weekday == 6 { 0.0 } else { (95.0 * load).round() },
    };

    match source {
        Source::Actual => actual,
        Source::Predicted => {
            let factor = 1.0 + DRIFT[(date.ordinal0() as usize) % DRIFT.len()];
            DailyCounts {
                date,
                pay_new: (actual.pay_new * factor).round(),
                pay_review: (actual.pay_review * factor).round(),
                free_new: (actual.free_new * factor).round(),
                free_review: (95.0 * load * factor).round(),
            }
        }
    }
}

async fn upsert_counts(pool: &PgPool, source: Source, counts: &DailyCounts) -> anyhow::Result<u64> {
    let (table, date_column) = table(source);
    let query = format!(
        "INSERT INTO {table} ({date_column}, pay_new, pay_review, free_new, free_review) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT ({date_column}) DO UPDATE \
         SET pay_new = EXCLUDED.pay_new, pay_review = EXCLUDED.pay_review, \
         free_new = EXCLUDED.free_new, free_review = EXCLUDED.free_review"
    );

    let result = sqlx::query(&query)
        .bind(counts.date)
        .bind(counts.pay_new)
        .bind(counts.pay_review)
        .bind(counts.free_new)
        .bind(counts.free_review)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

pub async fn seed(pool: &PgPool, today: NaiveDate, days: i64) -> anyhow::Result<usize> {
    let days = days.max(1);
    let start = today - Duration::days(days);

    for offset in 0..days {
        let date = start + Duration::days(offset);
        for source in [Source::Actual, Source::Predicted] {
            upsert_counts(pool, source, &placeholder_counts(date, source)).await?;
        }
    }

    info!(days, %start, "seeded placeholder series");
    Ok(days as usize)
}

pub fn validate_counts(counts: &DailyCounts, line: usize) -> Result<(), ImportError> {
    let columns = [
        ("pay_new", counts.pay_new),
        ("pay_review", counts.pay_review),
        ("free_new", counts.free_new),
        ("free_review", counts.free_review),
    ];

    for (column, value) in columns {
        if !value.is_finite() || value < 0.0 {
            return Err(ImportError::InvalidCount {
                line,
                column,
                value,
            });
        }
    }

    Ok(())
}

pub async fn import_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
    source: Source,
) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut upserted = 0usize;

    for (index, result) in reader.deserialize::<DailyCounts>().enumerate() {
        // header occupies line 1
        let line = index + 2;
        let counts = result.with_context(|| format!("invalid row on line {line}"))?;
        validate_counts(&counts, line)?;

        if upsert_counts(pool, source, &counts).await? > 0 {
            upserted += 1;
        }
    }

    debug!(upserted, ?source, "csv import finished");
    Ok(upserted)
}

pub async fn fetch_counts(
    pool: &PgPool,
    source: Source,
    since_date: NaiveDate,
) -> anyhow::Result<Vec<DailyCounts>> {
    let (table, date_column) = table(source);
    let query = format!(
        "SELECT {date_column} AS date, pay_new, pay_review, free_new, free_review \
         FROM {table} \
         WHERE {date_column} >= $1 \
         ORDER BY {date_column}"
    );

    let records = sqlx::query(&query)
        .bind(since_date)
        .fetch_all(pool)
        .await
        .with_context(|| format!("failed to fetch {table}"))?;

    let mut counts = Vec::with_capacity(records.len());
    for row in records {
        counts.push(DailyCounts {
            date: row.get("date"),
            pay_new: row.get("pay_new"),
            pay_review: row.get("pay_review"),
            free_new: row.get("free_new"),
            free_review: row.get("free_review"),
        });
    }

    debug!(rows = counts.len(), ?source, %since_date, "fetched counts");
    Ok(counts)
}

/// Both sources, fetched from the same cutoff.
pub async fn fetch_both(
    pool: &PgPool,
    since_date: NaiveDate,
) -> anyhow::Result<(Vec<DailyCounts>, Vec<DailyCounts>)> {
    let actual = fetch_counts(pool, Source::Actual, since_date).await?;
    let predicted = fetch_counts(pool, Source::Predicted, since_date).await?;
    Ok((actual, predicted))
}
