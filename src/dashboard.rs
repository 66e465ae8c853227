use chrono::NaiveDate;
use serde::Serialize;

use crate::deviation::{self, LookupError};
use crate::models::{
    observations, Category, DailyCounts, DeviationRow, TimeSeriesRow, Window, WindowSummary,
};

/// Everything a presentation layer needs to draw one category tab.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryPanel {
    pub category: Category,
    pub actual_label: &'static str,
    pub predicted_label: &'static str,
    pub bar_window: Window,
    pub line_window: Window,
    pub bar_series: Vec<TimeSeriesRow>,
    pub line_series: Vec<TimeSeriesRow>,
    /// Metric cards: the last 7 rows of the bar window.
    pub recent_summary: WindowSummary,
    /// Pie chart: within vs exceeded over the whole bar window.
    pub accuracy: WindowSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryComparison {
    pub category: Category,
    pub label: &'static str,
    pub actual: f64,
    pub predicted: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayComparison {
    pub date: NaiveDate,
    pub categories: Vec<CategoryComparison>,
}

pub fn merged_for(
    category: Category,
    actual: &[DailyCounts],
    predicted: &[DailyCounts],
) -> Vec<TimeSeriesRow> {
    deviation::merge_series(
        &observations(actual, category),
        &observations(predicted, category),
    )
}

pub fn build_panel(
    category: Category,
    actual: &[DailyCounts],
    predicted: &[DailyCounts],
    bar_window: Window,
    line_window: Window,
) -> CategoryPanel {
    let merged = merged_for(category, actual, predicted);
    let deviations = deviation::compute_deviation(&merged);

    let bar_rows: &[DeviationRow] = deviation::window_slice(&deviations, bar_window);
    let recent_rows = deviation::window_slice(bar_rows, Window::Last7);

    CategoryPanel {
        category,
        actual_label: category.label(),
        predicted_label: category.predicted_label(),
        bar_window,
        line_window,
        bar_series: deviation::window_slice(&merged, bar_window).to_vec(),
        line_series: deviation::window_slice(&merged, line_window).to_vec(),
        recent_summary: deviation::summarize_window(recent_rows),
        accuracy: deviation::summarize_window(bar_rows),
    }
}

/// Actual vs predicted for every category on the day before the latest date.
pub fn last_day_comparison(
    actual: &[DailyCounts],
    predicted: &[DailyCounts],
) -> Result<DayComparison, LookupError> {
    let merged: Vec<(Category, Vec<TimeSeriesRow>)> = Category::ALL
        .iter()
        .map(|&category| (category, merged_for(category, actual, predicted)))
        .collect();

    // every category shares the same joined dates
    let date = merged
        .first()
        .and_then(|(_, rows)| deviation::previous_day(rows))
        .ok_or(LookupError::EmptySeries)?;

    let mut categories = Vec::with_capacity(merged.len());
    for (category, rows) in &merged {
        let row = deviation::lookup_date(rows, date)?;
        categories.push(CategoryComparison {
            category: *category,
            label: category.label(),
            actual: row.actual,
            predicted: row.predicted,
        });
    }

    Ok(DayComparison { date, categories })
}

pub fn day_detail(
    category: Category,
    actual: &[DailyCounts],
    predicted: &[DailyCounts],
    date: NaiveDate,
) -> Result<TimeSeriesRow, LookupError> {
    deviation::lookup_date(&merged_for(category, actual, predicted), date)
}
