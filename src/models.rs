use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Operation categories tracked by both the actual and the forecast source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ValueEnum)]
pub enum Category {
    #[value(name = "pay-new")]
    PayNew,
    #[value(name = "pay-review")]
    PayReview,
    #[value(name = "free-new")]
    FreeNew,
    #[value(name = "free-review")]
    FreeReview,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::PayNew,
        Category::PayReview,
        Category::FreeNew,
        Category::FreeReview,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::PayNew => "PayopNew",
            Category::PayReview => "PayopReview",
            Category::FreeNew => "FreeopNew",
            Category::FreeReview => "FreeopReview",
        }
    }

    pub fn predicted_label(self) -> &'static str {
        match self {
            Category::PayNew => "EXP_PAY_NEW",
            Category::PayReview => "EXP_PAY_REV",
            Category::FreeNew => "EXP_FREE_NEW",
            Category::FreeReview => "EXP_FREE_REV",
        }
    }
}

/// Trailing slice of the series used for charts and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
pub enum Window {
    Last7,
    Last30,
    Last90,
    All,
}

impl Window {
    pub fn size(self) -> Option<usize> {
        match self {
            Window::Last7 => Some(7),
            Window::Last30 => Some(30),
            Window::Last90 => Some(90),
            Window::All => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Window::Last7 => "Last 1 Week",
            Window::Last30 => "Last 1 Month",
            Window::Last90 => "Last 3 Months",
            Window::All => "All Time",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Source {
    Actual,
    Predicted,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: f64,
}

/// One day of counts from a single source, all four categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCounts {
    pub date: NaiveDate,
    pub pay_new: f64,
    pub pay_review: f64,
    pub free_new: f64,
    pub free_review: f64,
}

impl DailyCounts {
    pub fn value(&self, category: Category) -> f64 {
        match category {
            Category::PayNew => self.pay_new,
            Category::PayReview => self.pay_review,
            Category::FreeNew => self.free_new,
            Category::FreeReview => self.free_review,
        }
    }

    pub fn observation(&self, category: Category) -> Observation {
        Observation {
            date: self.date,
            value: self.value(category),
        }
    }
}

pub fn observations(rows: &[DailyCounts], category: Category) -> Vec<Observation> {
    rows.iter().map(|row| row.observation(category)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeSeriesRow {
    pub date: NaiveDate,
    pub actual: f64,
    pub predicted: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Deviation {
    Evaluated { pct: f64, within_threshold: bool },
    /// `actual` was zero, so no percentage exists.
    Undefined,
}

impl Deviation {
    pub fn pct(&self) -> Option<f64> {
        match self {
            Deviation::Evaluated { pct, .. } => Some(*pct),
            Deviation::Undefined => None,
        }
    }

    pub fn within_threshold(&self) -> Option<bool> {
        match self {
            Deviation::Evaluated {
                within_threshold, ..
            } => Some(*within_threshold),
            Deviation::Undefined => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeviationRow {
    #[serde(flatten)]
    pub row: TimeSeriesRow,
    pub deviation: Deviation,
}

impl DeviationRow {
    pub fn date(&self) -> NaiveDate {
        self.row.date
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviationStats {
    pub mean_deviation_pct: f64,
    pub lowest: DeviationRow,
    pub highest: DeviationRow,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSummary {
    pub total_count: usize,
    pub evaluable_count: usize,
    pub not_evaluable_count: usize,
    pub within_count: usize,
    pub exceeded_count: usize,
    /// `None` when the window holds no evaluable rows.
    pub stats: Option<DeviationStats>,
}

impl WindowSummary {
    pub fn is_no_data(&self) -> bool {
        self.stats.is_none()
    }

    pub fn within_ratio(&self) -> Option<f64> {
        if self.evaluable_count == 0 {
            None
        } else {
            Some(self.within_count as f64 / self.evaluable_count as f64)
        }
    }
}
