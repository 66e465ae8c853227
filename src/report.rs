use std::fmt::Write;

use chrono::NaiveDate;

use crate::dashboard::{self, CategoryPanel};
use crate::deviation::{LookupError, DEVIATION_THRESHOLD_PCT};
use crate::models::{Category, DailyCounts, Deviation, DeviationRow, Window, WindowSummary};

pub fn format_pct(row: &DeviationRow) -> String {
    match row.deviation.pct() {
        Some(pct) => format!("{pct:.2}%"),
        None => "undefined".to_string(),
    }
}

pub fn describe_deviation(deviation: &Deviation) -> String {
    match (deviation.pct(), deviation.within_threshold()) {
        (Some(pct), Some(true)) => format!("{pct:.2}% deviation, within threshold"),
        (Some(pct), _) => format!("{pct:.2}% deviation, exceeded threshold"),
        _ => "deviation undefined (actual is zero)".to_string(),
    }
}

pub fn summary_lines(summary: &WindowSummary) -> Vec<String> {
    let Some(stats) = &summary.stats else {
        return vec![format!(
            "No data: {} of {} days have no evaluable deviation.",
            summary.not_evaluable_count, summary.total_count
        )];
    };

    let mut lines = vec![
        format!("Average deviation: {:.2}%", stats.mean_deviation_pct),
        format!(
            "Days within threshold: {}/{}",
            summary.within_count, summary.evaluable_count
        ),
        format!(
            "Lowest deviation day: {} ({})",
            stats.lowest.date(),
            format_pct(&stats.lowest)
        ),
        format!(
            "Highest deviation day: {} ({})",
            stats.highest.date(),
            format_pct(&stats.highest)
        ),
    ];

    if summary.not_evaluable_count > 0 {
        lines.push(format!(
            "Days with zero actual (not evaluable): {}",
            summary.not_evaluable_count
        ));
    }

    lines
}

fn write_panel(output: &mut String, panel: &CategoryPanel) {
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "## {} vs {}",
        panel.actual_label, panel.predicted_label
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "### Performance Metrics (Last 7 Days)");

    for line in summary_lines(&panel.recent_summary) {
        let _ = writeln!(output, "- {line}");
    }

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "### Prediction Accuracy ({})",
        panel.bar_window.label()
    );

    if panel.accuracy.is_no_data() {
        let _ = writeln!(output, "No evaluable days in this window.");
    } else {
        let _ = writeln!(
            output,
            "- Within threshold: {}",
            panel.accuracy.within_count
        );
        let _ = writeln!(
            output,
            "- Exceeded threshold: {}",
            panel.accuracy.exceeded_count
        );
        if let Some(ratio) = panel.accuracy.within_ratio() {
            let _ = writeln!(output, "- Within share: {:.0}%", ratio * 100.0);
        }
    }
}

pub fn build_report(
    cutoff: NaiveDate,
    bar_window: Window,
    actual: &[DailyCounts],
    predicted: &[DailyCounts],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Actual vs Predicted Report");
    let _ = writeln!(
        output,
        "Generated for data since {} (threshold {:.1}%)",
        cutoff, DEVIATION_THRESHOLD_PCT
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Last Day");

    match dashboard::last_day_comparison(actual, predicted) {
        Ok(comparison) => {
            let _ = writeln!(output, "Actual vs predicted for {}:", comparison.date);
            let _ = writeln!(output);
            let _ = writeln!(output, "| Category | Actual | Predicted |");
            let _ = writeln!(output, "|---|---|---|");
            for entry in comparison.categories.iter() {
                let _ = writeln!(
                    output,
                    "| {} | {} | {} |",
                    entry.label, entry.actual, entry.predicted
                );
            }
        }
        Err(LookupError::DateNotFound { date }) => {
            let _ = writeln!(output, "No data available for {date}.");
        }
        Err(LookupError::EmptySeries) => {
            let _ = writeln!(output, "No data recorded since {cutoff}.");
        }
    }

    for category in Category::ALL {
        let panel = dashboard::build_panel(category, actual, predicted, bar_window, Window::All);
        write_panel(&mut output, &panel);
    }

    output
}
