//! Derived statistics: phase classification, metric time series with
//! dose-bucket tagging, and the baseline/treatment KPI block.
//!
//! Everything here is a pure function over an AppState snapshot; the
//! chart and KPI cards re-derive on demand after every mutation.

use chrono::NaiveDate;

use crate::model::{AppState, DailyLog, DoseTaken, Estimates, Mode, Plan};
use crate::timeutil::{add_days, mean, parse_date};

/// Trial phase of a calendar date relative to the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PreStart,
    Baseline,
    Test,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::PreStart => "Pre-Start",
            Phase::Baseline => "Baseline",
            Phase::Test => "Test",
        }
    }
}

/// Last day of the advanced-mode baseline window, inclusive.
/// None when the start date is unset or the plan is in quick mode.
fn baseline_end(plan: &Plan) -> Option<NaiveDate> {
    if plan.mode != Mode::Advanced {
        return None;
    }
    let start = parse_date(&plan.start_date)?;
    Some(add_days(start, i64::from(plan.baseline_days) - 1))
}

/// Classify a date against the plan. None when no start date is set.
///
/// Quick mode has no baseline window: everything from the start date
/// on is Test. Advanced mode carves out the first `baseline_days` days
/// as Baseline.
pub fn classify_phase(plan: &Plan, date: NaiveDate) -> Option<Phase> {
    let start = parse_date(&plan.start_date)?;

    match plan.mode {
        Mode::Quick => {
            if date >= start {
                Some(Phase::Test)
            } else {
                Some(Phase::PreStart)
            }
        }
        Mode::Advanced => {
            let base_end = add_days(start, i64::from(plan.baseline_days) - 1);
            if date < start {
                Some(Phase::PreStart)
            } else if date <= base_end {
                Some(Phase::Baseline)
            } else {
                Some(Phase::Test)
            }
        }
    }
}

/// Dose-amount bucket used to color each plotted day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoseBucket {
    NoDose,
    OneCap,
    TwoCaps,
    ThreeCaps,
    FourPlusCaps,
}

impl DoseBucket {
    /// Bucket a day's dose. Half-open boundaries at 1.5/2.5/3.5
    /// capsules; a missing amount falls back to the plan default. A
    /// no-dose day is NoDose regardless of any stored amount.
    pub fn for_log(log: &DailyLog, default_dose: f64) -> Self {
        if log.took_dose != DoseTaken::Yes {
            return DoseBucket::NoDose;
        }
        let amount = log.dose_amount.unwrap_or(default_dose);
        if amount <= 1.5 {
            DoseBucket::OneCap
        } else if amount <= 2.5 {
            DoseBucket::TwoCaps
        } else if amount <= 3.5 {
            DoseBucket::ThreeCaps
        } else {
            DoseBucket::FourPlusCaps
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DoseBucket::NoDose => "No Dose",
            DoseBucket::OneCap => "1 Cap",
            DoseBucket::TwoCaps => "2 Caps",
            DoseBucket::ThreeCaps => "3 Caps",
            DoseBucket::FourPlusCaps => "4+ Caps",
        }
    }

    /// Fixed display color (hex) for chart dots and the legend.
    pub fn color(&self) -> &'static str {
        match self {
            DoseBucket::NoDose => "#5c6b7f",
            DoseBucket::OneCap => "#0dcaf0",
            DoseBucket::TwoCaps => "#2d5bff",
            DoseBucket::ThreeCaps => "#7d5fff",
            DoseBucket::FourPlusCaps => "#ffb45e",
        }
    }
}

/// A selectable chart metric, namespaced the way the state schema is:
/// sliders, wearables, advanced metrics, and the one daily-level field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKey {
    SleepQuality,
    Latency,
    Groggy,
    Energy,
    Focus,
    Mood,
    Stress,
    SleepScore,
    TotalSleep,
    DeepSleep,
    RemSleep,
    WakeUps,
    ReactionTime,
    RestingHr,
    Hrv,
}

impl MetricKey {
    /// Every selectable metric, in menu order.
    pub const ALL: [MetricKey; 15] = [
        MetricKey::SleepQuality,
        MetricKey::Latency,
        MetricKey::Groggy,
        MetricKey::Energy,
        MetricKey::Focus,
        MetricKey::Mood,
        MetricKey::Stress,
        MetricKey::SleepScore,
        MetricKey::TotalSleep,
        MetricKey::DeepSleep,
        MetricKey::RemSleep,
        MetricKey::WakeUps,
        MetricKey::ReactionTime,
        MetricKey::RestingHr,
        MetricKey::Hrv,
    ];

    /// Namespaced key as it appears in saved chart selections
    /// ("s." sliders, "w." wearables, "m." metrics, "d." daily).
    pub fn key(&self) -> &'static str {
        match self {
            MetricKey::SleepQuality => "s.sleep",
            MetricKey::Latency => "s.latency",
            MetricKey::Groggy => "s.groggy",
            MetricKey::Energy => "s.energy",
            MetricKey::Focus => "s.focus",
            MetricKey::Mood => "s.mood",
            MetricKey::Stress => "s.stress",
            MetricKey::SleepScore => "w.score",
            MetricKey::TotalSleep => "w.total",
            MetricKey::DeepSleep => "w.deep",
            MetricKey::RemSleep => "w.rem",
            MetricKey::WakeUps => "d.wakeUps",
            MetricKey::ReactionTime => "m.rt",
            MetricKey::RestingHr => "m.rhr",
            MetricKey::Hrv => "m.hrv",
        }
    }

    pub fn parse(key: &str) -> Option<MetricKey> {
        MetricKey::ALL.iter().copied().find(|m| m.key() == key)
    }

    pub fn label(&self) -> &'static str {
        match self {
            MetricKey::SleepQuality => "Sleep Quality",
            MetricKey::Latency => "Speed to Sleep",
            MetricKey::Groggy => "Morning Grogginess",
            MetricKey::Energy => "Energy",
            MetricKey::Focus => "Focus",
            MetricKey::Mood => "Mood",
            MetricKey::Stress => "Stress",
            MetricKey::SleepScore => "Sleep Score",
            MetricKey::TotalSleep => "Total Sleep (hrs)",
            MetricKey::DeepSleep => "Deep Sleep (min)",
            MetricKey::RemSleep => "REM Sleep (min)",
            MetricKey::WakeUps => "Wake Ups",
            MetricKey::ReactionTime => "Reaction Time",
            MetricKey::RestingHr => "Resting HR",
            MetricKey::Hrv => "HRV",
        }
    }

    /// Fixed chart axis bounds for this metric.
    pub fn axis_bounds(&self) -> (f64, f64) {
        match self {
            MetricKey::SleepQuality
            | MetricKey::Latency
            | MetricKey::Groggy
            | MetricKey::Energy
            | MetricKey::Focus
            | MetricKey::Mood
            | MetricKey::Stress
            | MetricKey::WakeUps => (0.0, 10.0),
            MetricKey::SleepScore => (0.0, 100.0),
            MetricKey::TotalSleep => (0.0, 12.0),
            MetricKey::DeepSleep | MetricKey::RemSleep => (0.0, 200.0),
            MetricKey::ReactionTime => (200.0, 500.0),
            MetricKey::RestingHr => (40.0, 100.0),
            MetricKey::Hrv => (0.0, 150.0),
        }
    }

    /// The self-reported estimate backing this metric in quick mode.
    /// Wearable durations and advanced metrics have no estimate.
    pub fn estimate(&self, estimates: &Estimates) -> Option<f64> {
        match self {
            MetricKey::SleepQuality => estimates.sleep,
            MetricKey::Latency => estimates.latency,
            MetricKey::Groggy => estimates.groggy,
            MetricKey::Energy => estimates.energy,
            MetricKey::Focus => estimates.focus,
            MetricKey::Mood => estimates.mood,
            MetricKey::Stress => estimates.stress,
            MetricKey::SleepScore => estimates.score,
            MetricKey::WakeUps => estimates.wake_ups,
            _ => None,
        }
    }

    /// Resolve this metric's raw value from a log. "H:MM" total-sleep
    /// strings convert to fractional hours; anything non-numeric
    /// resolves to None and the day drops out of the series.
    pub fn raw_value(&self, log: &DailyLog) -> Option<f64> {
        match self {
            MetricKey::SleepQuality => Some(log.sliders.sleep),
            MetricKey::Latency => Some(log.sliders.latency),
            MetricKey::Groggy => Some(log.sliders.groggy),
            MetricKey::Energy => Some(log.sliders.energy),
            MetricKey::Focus => Some(log.sliders.focus),
            MetricKey::Mood => Some(log.sliders.mood),
            MetricKey::Stress => Some(log.sliders.stress),
            MetricKey::SleepScore => log.wearables.score,
            MetricKey::TotalSleep => parse_duration_hours(log.wearables.total.as_deref()?),
            MetricKey::DeepSleep => log.wearables.deep,
            MetricKey::RemSleep => log.wearables.rem,
            MetricKey::WakeUps => log.wake_ups,
            MetricKey::ReactionTime => log.metrics.rt,
            MetricKey::RestingHr => log.metrics.rhr,
            MetricKey::Hrv => log.metrics.hrv,
        }
    }
}

/// "H:MM" to fractional hours. A bare number passes through.
fn parse_duration_hours(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    match raw.split_once(':') {
        Some((h, m)) => {
            let hours: f64 = h.trim().parse().ok()?;
            let minutes: f64 = m.trim().parse().ok()?;
            Some(hours + minutes / 60.0)
        }
        None => raw.parse().ok(),
    }
}

/// One plotted day.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPoint {
    pub date: String,
    pub value: f64,
    pub bucket: DoseBucket,
}

/// A metric's extracted time series plus the two KPI sample sets.
#[derive(Debug, Clone, Default)]
pub struct Series {
    /// Points in ascending date order, finite values only.
    pub points: Vec<ChartPoint>,
    pub baseline_vals: Vec<f64>,
    pub treatment_vals: Vec<f64>,
}

/// Extract the series for one metric.
///
/// Days without a finite value are excluded entirely: not plotted,
/// not counted. Each included day is tagged with its dose bucket and
/// classified into the baseline and/or treatment sample set:
/// baseline = advanced mode and date at or before the baseline end;
/// treatment = dose taken and past the window (or at/after the start
/// date in quick mode). A pre-start or no-dose day can be plotted
/// while belonging to neither set.
pub fn build_series(state: &AppState, metric: MetricKey) -> Series {
    let plan = &state.plan;
    let start = parse_date(&plan.start_date);
    let base_end = baseline_end(plan);

    let mut series = Series::default();

    for (date_str, log) in &state.daily {
        let value = match metric.raw_value(log) {
            Some(v) if v.is_finite() => v,
            _ => continue,
        };

        let bucket = DoseBucket::for_log(log, plan.default_dose);
        let dosed = log.took_dose == DoseTaken::Yes;

        if let Some(date) = parse_date(date_str) {
            if let Some(base_end) = base_end {
                if date <= base_end {
                    series.baseline_vals.push(value);
                }
                if dosed && date > base_end {
                    series.treatment_vals.push(value);
                }
            } else if let Some(start) = start {
                // Quick mode: no baseline window, treatment from day one.
                if dosed && date >= start {
                    series.treatment_vals.push(value);
                }
            }
        }

        series.points.push(ChartPoint {
            date: date_str.clone(),
            value,
            bucket,
        });
    }

    series
}

/// Trailing moving average over the series values; a window of 0 or 1
/// returns the values unchanged. Feeds the chart's smoothing control.
pub fn smooth(points: &[ChartPoint], window: usize) -> Vec<f64> {
    if window <= 1 {
        return points.iter().map(|p| p.value).collect();
    }
    points
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let lo = i.saturating_sub(window - 1);
            let slice: Vec<f64> = points[lo..=i].iter().map(|p| p.value).collect();
            mean(&slice).unwrap_or(points[i].value)
        })
        .collect()
}

/// The KPI block for the selected metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Kpi {
    pub baseline: Option<f64>,
    pub treatment: Option<f64>,
    /// treatment − baseline; None when either side has no data.
    pub delta: Option<f64>,
    /// "Estimated" (quick mode) or "Calculated" (advanced mode).
    pub baseline_label: &'static str,
}

/// Compute the baseline/treatment means and their difference.
///
/// Quick mode reads the baseline from the plan's self-reported
/// estimate for the metric (None when the metric has no estimate
/// field); advanced mode averages the baseline sample set.
pub fn compute_kpi(plan: &Plan, metric: MetricKey, series: &Series) -> Kpi {
    let (baseline, baseline_label) = match plan.mode {
        Mode::Quick => (metric.estimate(&plan.estimates), "Estimated"),
        Mode::Advanced => (mean(&series.baseline_vals), "Calculated"),
    };
    let treatment = mean(&series.treatment_vals);
    let delta = match (baseline, treatment) {
        (Some(b), Some(t)) => Some(t - b),
        _ => None,
    };

    Kpi {
        baseline,
        treatment,
        delta,
        baseline_label,
    }
}
