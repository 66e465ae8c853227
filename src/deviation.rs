use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};
use thiserror::Error;
use tracing::debug;

use crate::models::{
    Deviation, DeviationRow, DeviationStats, Observation, TimeSeriesRow, Window, WindowSummary,
};

/// Largest deviation, in percent of the actual count, still counted as accurate.
pub const DEVIATION_THRESHOLD_PCT: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("no data available for {date}")]
    DateNotFound { date: NaiveDate },
    #[error("series is empty")]
    EmptySeries,
}

/// Inner join of both sources on date, ascending. Dates present in only one
/// source are dropped; the first observation wins for a repeated date.
pub fn merge_series(actual: &[Observation], predicted: &[Observation]) -> Vec<TimeSeriesRow> {
    let mut predicted_by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for observation in predicted {
        predicted_by_date
            .entry(observation.date)
            .or_insert(observation.value);
    }

    let mut merged: BTreeMap<NaiveDate, TimeSeriesRow> = BTreeMap::new();
    let mut actual_dates: BTreeSet<NaiveDate> = BTreeSet::new();
    for observation in actual {
        if !actual_dates.insert(observation.date) {
            continue;
        }
        if let Some(&predicted) = predicted_by_date.get(&observation.date) {
            merged.insert(
                observation.date,
                TimeSeriesRow {
                    date: observation.date,
                    actual: observation.value,
                    predicted,
                },
            );
        }
    }

    let dropped = predicted_by_date.len() + actual_dates.len() - 2 * merged.len();
    if dropped > 0 {
        debug!(dropped, merged = merged.len(), "dates missing from one source");
    }

    merged.into_values().collect()
}

pub fn deviation_for(actual: f64, predicted: f64) -> Deviation {
    if actual == 0.0 {
        return Deviation::Undefined;
    }

    let pct = (actual - predicted).abs() * 100.0 / actual;
    Deviation::Evaluated {
        pct,
        within_threshold: pct <= DEVIATION_THRESHOLD_PCT,
    }
}

pub fn compute_deviation(rows: &[TimeSeriesRow]) -> Vec<DeviationRow> {
    rows.iter()
        .map(|row| DeviationRow {
            row: *row,
            deviation: deviation_for(row.actual, row.predicted),
        })
        .collect()
}

/// Trailing rows for the window; the whole series when it is shorter.
pub fn window_slice<T>(rows: &[T], window: Window) -> &[T] {
    match window.size() {
        Some(size) if size < rows.len() => &rows[rows.len() - size..],
        _ => rows,
    }
}

pub fn summarize_window(rows: &[DeviationRow]) -> WindowSummary {
    let mut evaluable_count = 0usize;
    let mut within_count = 0usize;
    let mut total_pct = 0.0;
    let mut lowest: Option<(f64, &DeviationRow)> = None;
    let mut highest: Option<(f64, &DeviationRow)> = None;

    for row in rows {
        let Deviation::Evaluated {
            pct,
            within_threshold,
        } = row.deviation
        else {
            continue;
        };

        evaluable_count += 1;
        total_pct += pct;
        if within_threshold {
            within_count += 1;
        }

        // strict comparisons keep the earliest row on ties
        if lowest.map_or(true, |(min, _)| pct < min) {
            lowest = Some((pct, row));
        }
        if highest.map_or(true, |(max, _)| pct > max) {
            highest = Some((pct, row));
        }
    }

    let stats = match (lowest, highest) {
        (Some((_, lowest)), Some((_, highest))) => Some(DeviationStats {
            mean_deviation_pct: total_pct / evaluable_count as f64,
            lowest: *lowest,
            highest: *highest,
        }),
        _ => None,
    };

    WindowSummary {
        total_count: rows.len(),
        evaluable_count,
        not_evaluable_count: rows.len() - evaluable_count,
        within_count,
        exceeded_count: evaluable_count - within_count,
        stats,
    }
}

pub fn lookup_date(rows: &[TimeSeriesRow], target: NaiveDate) -> Result<TimeSeriesRow, LookupError> {
    rows.iter()
        .find(|row| row.date == target)
        .copied()
        .ok_or(LookupError::DateNotFound { date: target })
}

/// The day before the latest date in the series.
pub fn previous_day(rows: &[TimeSeriesRow]) -> Option<NaiveDate> {
    rows.iter()
        .map(|row| row.date)
        .max()
        .map(|latest| latest - Duration::days(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 24).unwrap() + Duration::days(offset)
    }

    fn obs(offset: i64, value: f64) -> Observation {
        Observation {
            date: day(offset),
            value,
        }
    }

    fn row(offset: i64, actual: f64, predicted: f64) -> TimeSeriesRow {
        TimeSeriesRow {
            date: day(offset),
            actual,
            predicted,
        }
    }

    #[test]
    fn boundary_deviation_counts_as_within() {
        let merged = merge_series(&[obs(0, 80.0), obs(1, 90.0)], &[obs(0, 72.0), obs(1, 99.0)]);
        let deviations = compute_deviation(&merged);

        for deviation in &deviations {
            let pct = deviation.deviation.pct().unwrap();
            assert!((pct - 10.0).abs() < 1e-9);
        }

        let summary = summarize_window(&deviations);
        assert_eq!(summary.within_count, 2);
        assert_eq!(summary.total_count, 2);
        assert_eq!(summary.evaluable_count, 2);
        let stats = summary.stats.unwrap();
        assert!((stats.mean_deviation_pct - 10.0).abs() < 1e-9);
    }

    #[test]
    fn exact_threshold_is_within() {
        assert_eq!(
            deviation_for(100.0, 110.0),
            Deviation::Evaluated {
                pct: 10.0,
                within_threshold: true
            }
        );
        assert_eq!(deviation_for(100.0, 111.0).within_threshold(), Some(false));
    }

    #[test]
    fn zero_actual_is_undefined() {
        let merged = merge_series(&[obs(0, 0.0)], &[obs(0, 5.0)]);
        let deviations = compute_deviation(&merged);
        assert_eq!(deviations[0].deviation, Deviation::Undefined);

        let summary = summarize_window(&deviations);
        assert!(summary.is_no_data());
        assert_eq!(summary.evaluable_count, 0);
        assert_eq!(summary.not_evaluable_count, 1);
        assert_eq!(summary.within_ratio(), None);
    }

    #[test]
    fn empty_window_is_no_data() {
        let summary = summarize_window(&[]);
        assert!(summary.is_no_data());
        assert_eq!(summary.total_count, 0);
    }

    #[test]
    fn merge_drops_unmatched_dates() {
        let merged = merge_series(&[obs(0, 5.0), obs(1, 6.0)], &[obs(1, 7.0)]);
        assert_eq!(merged, vec![row(1, 6.0, 7.0)]);
    }

    #[test]
    fn merge_with_empty_source_is_empty() {
        assert!(merge_series(&[], &[obs(0, 1.0)]).is_empty());
        assert!(merge_series(&[obs(0, 1.0)], &[]).is_empty());
    }

    #[test]
    fn merge_sorts_and_keeps_first_duplicate() {
        let merged = merge_series(
            &[obs(2, 3.0), obs(0, 1.0), obs(0, 99.0)],
            &[obs(0, 4.0), obs(2, 6.0), obs(2, 50.0)],
        );
        assert_eq!(merged, vec![row(0, 1.0, 4.0), row(2, 3.0, 6.0)]);
    }

    #[test]
    fn extrema_ties_keep_earliest_row() {
        let rows = compute_deviation(&[
            row(0, 100.0, 105.0),
            row(1, 100.0, 120.0),
            row(2, 100.0, 95.0),
            row(3, 100.0, 80.0),
        ]);
        let stats = summarize_window(&rows).stats.unwrap();
        assert_eq!(stats.lowest.date(), day(0));
        assert_eq!(stats.highest.date(), day(1));
    }

    #[test]
    fn undefined_rows_are_excluded_from_stats() {
        let rows = compute_deviation(&[row(0, 0.0, 3.0), row(1, 50.0, 60.0), row(2, 100.0, 100.0)]);
        let summary = summarize_window(&rows);
        assert_eq!(summary.total_count, 3);
        assert_eq!(summary.evaluable_count, 2);
        assert_eq!(summary.not_evaluable_count, 1);
        assert_eq!(summary.within_count, 1);
        assert_eq!(summary.exceeded_count, 1);
        let stats = summary.stats.unwrap();
        assert!((stats.mean_deviation_pct - 10.0).abs() < 1e-9);
        assert_eq!(stats.lowest.date(), day(2));
        assert_eq!(stats.highest.date(), day(1));
    }

    #[test]
    fn short_series_returns_everything() {
        let rows: Vec<TimeSeriesRow> = (0..5).map(|i| row(i, 1.0, 1.0)).collect();
        assert_eq!(window_slice(&rows, Window::Last7).len(), 5);
        assert_eq!(window_slice(&rows, Window::All).len(), 5);
    }

    #[test]
    fn lookup_reports_missing_date() {
        let rows = vec![row(0, 1.0, 2.0), row(1, 3.0, 4.0)];
        assert_eq!(lookup_date(&rows, day(1)), Ok(row(1, 3.0, 4.0)));
        assert_eq!(
            lookup_date(&rows, day(5)),
            Err(LookupError::DateNotFound { date: day(5) })
        );
    }

    #[test]
    fn previous_day_is_one_before_latest() {
        let rows = vec![row(3, 1.0, 1.0), row(0, 1.0, 1.0)];
        assert_eq!(previous_day(&rows), Some(day(2)));
        assert_eq!(previous_day(&[]), None);
    }

    fn observations_strategy() -> impl Strategy<Value = Vec<Observation>> {
        prop::collection::vec((0i64..60, 0.0..500.0f64), 0..40).prop_map(|points| {
            points
                .into_iter()
                .map(|(offset, value)| obs(offset, value))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn merged_dates_are_exactly_the_shared_dates(
            actual in observations_strategy(),
            predicted in observations_strategy(),
        ) {
            let merged = merge_series(&actual, &predicted);

            let mut shared: Vec<NaiveDate> = actual
                .iter()
                .map(|o| o.date)
                .filter(|date| predicted.iter().any(|p| p.date == *date))
                .collect();
            shared.sort_unstable();
            shared.dedup();

            let merged_dates: Vec<NaiveDate> = merged.iter().map(|r| r.date).collect();
            prop_assert_eq!(merged_dates, shared);
        }

        #[test]
        fn window_keeps_latest_rows_in_order(len in 0usize..120) {
            let rows: Vec<TimeSeriesRow> = (0..len as i64).map(|i| row(i, 1.0, 1.0)).collect();
            for window in [Window::Last7, Window::Last30, Window::Last90] {
                let size = window.size().unwrap();
                let slice = window_slice(&rows, window);
                prop_assert_eq!(slice.len(), len.min(size));
                prop_assert_eq!(slice, &rows[len - len.min(size)..]);
            }
        }

        #[test]
        fn deviation_matches_formula(actual in 0.0..1000.0f64, predicted in 0.0..1000.0f64) {
            match deviation_for(actual, predicted) {
                Deviation::Evaluated { pct, within_threshold } => {
                    prop_assert!(actual != 0.0);
                    let expected = (actual - predicted).abs() / actual * 100.0;
                    prop_assert!((pct - expected).abs() <= expected * 1e-12 + 1e-9);
                    prop_assert_eq!(within_threshold, pct <= DEVIATION_THRESHOLD_PCT);
                }
                Deviation::Undefined => prop_assert_eq!(actual, 0.0),
            }
        }

        #[test]
        fn summary_is_repeatable(actual in observations_strategy(), predicted in observations_strategy()) {
            let rows = compute_deviation(&merge_series(&actual, &predicted));
            prop_assert_eq!(summarize_window(&rows), summarize_window(&rows));
        }
    }
}
