//! Daily production summary computed from stored records.
//!
//! [`filter_by_range`] narrows records to a recent period, [`daily_totals`]
//! folds them into one row per date with the mean weight of each shift,
//! [`analyze`] derives headline figures from those rows and [`predict`]
//! extrapolates the next three days.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Days, Months, NaiveDate};
use serde::Serialize;

use crate::record::{StoredRecord, Turno};

/// Date format used by the device for `fecha`.
const FECHA_FORMAT: &str = "%d/%m/%Y";
/// Number of days averaged at each end of the range for the variation.
const VARIATION_WINDOW: usize = 3;
/// Variation (in percent) beyond which the trend is no longer stable.
const TREND_THRESHOLD_PCT: f64 = 5.0;
/// Most recent days fitted by the prediction.
const PREDICTION_WINDOW: usize = 5;
/// Fewer days than this are averaged instead of fitted.
const PREDICTION_MIN_DAYS: usize = 3;
/// Daily slope (weight units) below which production counts as stable.
const STABLE_SLOPE: f64 = 0.1;
/// Coefficient of variation (percent) under which confidence is high.
const HIGH_CONFIDENCE_CV_PCT: f64 = 15.0;
/// Coefficient of variation (percent) above which confidence is low.
const LOW_CONFIDENCE_CV_PCT: f64 = 30.0;

/// Period of recent records kept by [`filter_by_range`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeRange {
    /// Last 7 days.
    Week,
    /// Last month.
    Month,
    /// Last 3 months.
    Quarter,
    /// Last 6 months.
    HalfYear,
    /// Last 12 months.
    Year,
    /// Every record.
    All,
}

impl TimeRange {
    /// Earliest date inside the range ending on `today`; `None` for
    /// [`TimeRange::All`]. Month arithmetic clamps to the end of shorter months.
    #[must_use]
    pub fn start(self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            Self::Week => today.checked_sub_days(Days::new(7)),
            Self::Month => today.checked_sub_months(Months::new(1)),
            Self::Quarter => today.checked_sub_months(Months::new(3)),
            Self::HalfYear => today.checked_sub_months(Months::new(6)),
            Self::Year => today.checked_sub_months(Months::new(12)),
            Self::All => None,
        }
    }

    /// Returns the display label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Week => "week",
            Self::Month => "month",
            Self::Quarter => "quarter",
            Self::HalfYear => "half-year",
            Self::Year => "year",
            Self::All => "all",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One day of production.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTotal {
    /// Date as reported by the device (`dd/mm/yyyy`).
    pub fecha: String,
    /// Mean morning weight, 0 when there were no morning readings.
    pub am: f64,
    /// Mean afternoon weight, 0 when there were no afternoon readings.
    pub pm: f64,
    /// `am + pm`.
    pub total: f64,
}

/// Direction of production over the analyzed range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    /// Variation above the threshold.
    Rising,
    /// Variation within the threshold.
    Stable,
    /// Variation below the negative threshold.
    Falling,
}

impl Trend {
    fn from_variation(variation_pct: f64) -> Self {
        if variation_pct > TREND_THRESHOLD_PCT {
            Self::Rising
        } else if variation_pct < -TREND_THRESHOLD_PCT {
            Self::Falling
        } else {
            Self::Stable
        }
    }

    /// Returns the display label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rising => "rising",
            Self::Stable => "stable",
            Self::Falling => "falling",
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Headline figures over a list of [`DailyTotal`]s.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    /// Sum of daily totals.
    pub total: f64,
    /// `total / days`.
    pub daily_average: f64,
    /// Mean of the daily morning values.
    pub am_average: f64,
    /// Mean of the daily afternoon values.
    pub pm_average: f64,
    /// Percent change of the last days' mean against the first days' mean.
    pub variation_pct: f64,
    /// Direction derived from `variation_pct`.
    pub trend: Trend,
    /// Highest daily total.
    pub max_day: f64,
    /// Lowest daily total.
    pub min_day: f64,
    /// Number of days with data.
    pub days: usize,
}

impl Default for Analysis {
    fn default() -> Self {
        Self {
            total: 0.0,
            daily_average: 0.0,
            am_average: 0.0,
            pm_average: 0.0,
            variation_pct: 0.0,
            trend: Trend::Stable,
            max_day: 0.0,
            min_day: 0.0,
            days: 0,
        }
    }
}

impl Analysis {
    /// One-line reading of the trend, e.g. `Production rising (7.5% over the period)`.
    #[must_use]
    pub fn interpretation(&self) -> String {
        if self.days == 0 {
            return "Not enough data".to_string();
        }
        format!(
            "Production {} ({:.1}% over the period)",
            self.trend,
            self.variation_pct.abs()
        )
    }
}

/// How much the prediction can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Recent totals vary by less than 15 %.
    High,
    /// Recent totals vary by 15 % to 30 %.
    Medium,
    /// Recent totals vary by more than 30 %, or there is too little data.
    Low,
}

impl Confidence {
    fn from_variation(cv_pct: f64) -> Self {
        if cv_pct < HIGH_CONFIDENCE_CV_PCT {
            Self::High
        } else if cv_pct > LOW_CONFIDENCE_CV_PCT {
            Self::Low
        } else {
            Self::Medium
        }
    }

    /// Returns the display label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the prediction looks the way it does.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "slope")]
pub enum Outlook {
    /// No days to work from.
    NoData,
    /// Fewer than three days; the prediction is their mean.
    InsufficientData,
    /// Fitted slope within ±0.1 per day.
    Stable,
    /// Fitted slope (per day) above 0.1.
    Rising(f64),
    /// Fitted slope (per day) below -0.1.
    Falling(f64),
}

impl fmt::Display for Outlook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData => f.write_str("No data available"),
            Self::InsufficientData => f.write_str("Not enough data for an accurate prediction"),
            Self::Stable => f.write_str("Stable production"),
            Self::Rising(slope) => write!(f, "Rising trend (~{slope:.2} per day)"),
            Self::Falling(slope) => write!(f, "Falling trend (~{:.2} per day)", slope.abs()),
        }
    }
}

/// Daily totals expected for the next three days.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Predicted totals, never negative.
    pub next_days: [f64; 3],
    /// Trust in the figures.
    pub confidence: Confidence,
    /// Direction behind the figures.
    pub outlook: Outlook,
}

#[derive(Default)]
struct ShiftSums {
    am: Vec<f64>,
    pm: Vec<f64>,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        let len = values.len() as f64;
        values.iter().sum::<f64>() / len
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn parse_fecha(fecha: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(fecha.trim(), FECHA_FORMAT).ok()
}

/// Keeps the records dated within `range` of `today`, bounds inclusive.
///
/// Records whose `fecha` does not parse are dropped by every bounded range
/// and kept by [`TimeRange::All`].
#[must_use]
pub fn filter_by_range(
    records: &[StoredRecord],
    range: TimeRange,
    today: NaiveDate,
) -> Vec<StoredRecord> {
    let Some(start) = range.start(today) else {
        return records.to_vec();
    };
    records
        .iter()
        .filter(|record| parse_fecha(&record.fecha).is_some_and(|date| date >= start))
        .cloned()
        .collect()
}

/// Groups records by date and averages the weight of each shift.
///
/// Readings with an unspecified shift still create the day but do not
/// contribute to either mean. Rows are sorted by date; dates that do not
/// parse as `dd/mm/yyyy` sort last.
#[must_use]
pub fn daily_totals(records: &[StoredRecord]) -> Vec<DailyTotal> {
    let mut by_fecha: BTreeMap<&str, ShiftSums> = BTreeMap::new();
    for record in records {
        let sums = by_fecha.entry(record.fecha.as_str()).or_default();
        match record.turno {
            Turno::Am => sums.am.push(record.peso),
            Turno::Pm => sums.pm.push(record.peso),
            Turno::Unspecified => {}
        }
    }

    let mut rows: Vec<(Option<NaiveDate>, DailyTotal)> = by_fecha
        .into_iter()
        .map(|(fecha, sums)| {
            let am = mean(&sums.am);
            let pm = mean(&sums.pm);
            let row = DailyTotal {
                fecha: fecha.to_string(),
                am: round2(am),
                pm: round2(pm),
                total: round2(am + pm),
            };
            (parse_fecha(fecha), row)
        })
        .collect();

    // `None` orders before `Some`, so compare on (is_none, date).
    rows.sort_by_key(|(date, _)| (date.is_none(), *date));
    rows.into_iter().map(|(_, row)| row).collect()
}

/// Computes headline figures; an empty input yields zeros and a stable trend.
#[must_use]
pub fn analyze(days: &[DailyTotal]) -> Analysis {
    if days.is_empty() {
        return Analysis::default();
    }

    let totals: Vec<f64> = days.iter().map(|d| d.total).collect();
    let ams: Vec<f64> = days.iter().map(|d| d.am).collect();
    let pms: Vec<f64> = days.iter().map(|d| d.pm).collect();

    let total: f64 = totals.iter().sum();
    let window = VARIATION_WINDOW.min(totals.len());
    let first_mean = mean(&totals[..window]);
    let last_mean = mean(&totals[totals.len() - window..]);
    let variation_pct = if first_mean > 0.0 {
        round2((last_mean - first_mean) / first_mean * 100.0)
    } else {
        0.0
    };

    Analysis {
        total,
        daily_average: mean(&totals),
        am_average: mean(&ams),
        pm_average: mean(&pms),
        variation_pct,
        trend: Trend::from_variation(variation_pct),
        max_day: totals.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        min_day: totals.iter().copied().fold(f64::INFINITY, f64::min),
        days: days.len(),
    }
}

/// Extrapolates the next three daily totals.
///
/// Fits a least-squares line through the last five totals (x = 1..=n) and
/// evaluates it at n+1..=n+3. Confidence comes from the coefficient of
/// variation of those totals. With fewer than three days the mean is
/// repeated with low confidence.
#[must_use]
pub fn predict(days: &[DailyTotal]) -> Prediction {
    if days.is_empty() {
        return Prediction {
            next_days: [0.0; 3],
            confidence: Confidence::Low,
            outlook: Outlook::NoData,
        };
    }

    let totals: Vec<f64> = days.iter().map(|d| d.total).collect();
    if totals.len() < PREDICTION_MIN_DAYS {
        let average = mean(&totals);
        return Prediction {
            next_days: [average; 3],
            confidence: Confidence::Low,
            outlook: Outlook::InsufficientData,
        };
    }

    let recent = &totals[totals.len().saturating_sub(PREDICTION_WINDOW)..];
    #[allow(clippy::cast_precision_loss)]
    let n = recent.len() as f64;
    let sum_x = n * (n + 1.0) / 2.0;
    let sum_x2 = n * (n + 1.0) * (2.0 * n + 1.0) / 6.0;
    let sum_y: f64 = recent.iter().sum();
    let sum_xy: f64 = recent
        .iter()
        .zip(1_u32..)
        .map(|(y, x)| f64::from(x) * y)
        .sum();

    let slope = (n * sum_xy - sum_x * sum_y) / (n * sum_x2 - sum_x * sum_x);
    let intercept = (sum_y - slope * sum_x) / n;
    let at = |step: f64| round2(intercept + slope * (n + step)).max(0.0);

    let average = sum_y / n;
    let deviation = (recent.iter().map(|v| (v - average).powi(2)).sum::<f64>() / n).sqrt();
    // A zero mean has no meaningful spread ratio.
    let confidence = if average > 0.0 {
        Confidence::from_variation(deviation / average * 100.0)
    } else {
        Confidence::Medium
    };

    let outlook = if slope.abs() < STABLE_SLOPE {
        Outlook::Stable
    } else if slope > 0.0 {
        Outlook::Rising(slope)
    } else {
        Outlook::Falling(slope)
    };

    Prediction {
        next_days: [at(1.0), at(2.0), at(3.0)],
        confidence,
        outlook,
    }
}
