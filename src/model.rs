//! Entity model: the trial Plan, per-day check-in logs, and the
//! AppState aggregate that is the unit of persistence and export.
//!
//! Field names follow the state JSON the web client produced
//! (camelCase entities, snake_case advanced metrics), so dumps from
//! earlier versions of the tracker parse unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Schema version carried in every persisted AppState.
pub const STATE_VERSION: f64 = 4.3;

/// Fixed namespace key for the single local-cache slot.
pub const STORAGE_KEY: &str = "trialmate_state_v4_3";

/// Midpoint default for any slider the user did not move before saving.
const SLIDER_MIDPOINT: f64 = 5.0;

fn slider_midpoint() -> f64 {
    SLIDER_MIDPOINT
}

/// Accepts a number, a numeric string, an empty string, or null.
///
/// Older exports encode "unset" numeric fields as `""`; this folds all
/// of those into None instead of failing the whole import.
fn de_blankable<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Num(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => Ok(s.trim().parse::<f64>().ok()),
        None => Ok(None),
    }
}

/// Baseline mode for the trial.
///
/// Quick mode compares against one-time self-reported estimates.
/// Advanced mode tracks a dedicated baseline window of
/// `Plan::baseline_days` days starting at the start date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Quick,
    Advanced,
}

/// Self-reported baseline estimates, one per tracked metric.
/// Only consulted in quick mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Estimates {
    #[serde(default, deserialize_with = "de_blankable")]
    pub sleep: Option<f64>,
    #[serde(default, deserialize_with = "de_blankable")]
    pub latency: Option<f64>,
    #[serde(default, deserialize_with = "de_blankable")]
    pub wake_ups: Option<f64>,
    #[serde(default, deserialize_with = "de_blankable")]
    pub energy: Option<f64>,
    #[serde(default, deserialize_with = "de_blankable")]
    pub groggy: Option<f64>,
    #[serde(default, deserialize_with = "de_blankable")]
    pub focus: Option<f64>,
    #[serde(default, deserialize_with = "de_blankable")]
    pub mood: Option<f64>,
    #[serde(default, deserialize_with = "de_blankable")]
    pub stress: Option<f64>,
    #[serde(default, deserialize_with = "de_blankable")]
    pub score: Option<f64>,
}

/// Reminder configuration (dose reminder and nightly check-in).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminders {
    pub enabled: bool,
    /// "HH:MM" local time for the dose reminder.
    pub dose_time: String,
    /// "HH:MM" local time for the nightly check-in reminder.
    pub nightly_time: String,
}

impl Default for Reminders {
    fn default() -> Self {
        Self {
            enabled: true,
            dose_time: "21:30".to_string(),
            nightly_time: "08:00".to_string(),
        }
    }
}

/// The trial configuration. Replaced wholesale on every plan save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Plan {
    pub participant_name: String,
    pub participant_email: String,
    pub product_name: String,
    pub product_version: String,
    /// Trial anchor date as `YYYY-MM-DD`; empty string means unset.
    pub start_date: String,
    /// Length of the tracked baseline window. Advanced mode only.
    pub baseline_days: u32,
    pub dose_notes: String,
    /// Capsules per dose when the check-in doesn't say otherwise.
    pub default_dose: f64,
    pub mode: Mode,
    pub estimates: Estimates,
    pub reminders: Reminders,
}

impl Default for Plan {
    fn default() -> Self {
        Self {
            participant_name: String::new(),
            participant_email: String::new(),
            product_name: "LIFESPAN+ DeepCell".to_string(),
            product_version: String::new(),
            start_date: String::new(),
            baseline_days: 7,
            dose_notes: "3 capsules 30 mins before bed".to_string(),
            default_dose: 3.0,
            mode: Mode::Quick,
            estimates: Estimates::default(),
            reminders: Reminders::default(),
        }
    }
}

/// Whether the dose was taken on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoseTaken {
    Yes,
    No,
}

impl DoseTaken {
    pub fn as_str(&self) -> &'static str {
        match self {
            DoseTaken::Yes => "yes",
            DoseTaken::No => "no",
        }
    }
}

/// The seven subjective 0-10 ratings captured every night.
///
/// When a log is persisted all seven keys are materialized; any rating
/// the user never touched lands on the midpoint via the serde defaults
/// below. Partial slider sets only exist in transient editing state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sliders {
    #[serde(default = "slider_midpoint")]
    pub sleep: f64,
    #[serde(default = "slider_midpoint")]
    pub latency: f64,
    #[serde(default = "slider_midpoint")]
    pub groggy: f64,
    #[serde(default = "slider_midpoint")]
    pub energy: f64,
    #[serde(default = "slider_midpoint")]
    pub focus: f64,
    #[serde(default = "slider_midpoint")]
    pub mood: f64,
    #[serde(default = "slider_midpoint")]
    pub stress: f64,
}

impl Default for Sliders {
    fn default() -> Self {
        Self {
            sleep: SLIDER_MIDPOINT,
            latency: SLIDER_MIDPOINT,
            groggy: SLIDER_MIDPOINT,
            energy: SLIDER_MIDPOINT,
            focus: SLIDER_MIDPOINT,
            mood: SLIDER_MIDPOINT,
            stress: SLIDER_MIDPOINT,
        }
    }
}

/// Wearable-sourced sleep data, all optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Wearables {
    /// Sleep score 0-100.
    #[serde(deserialize_with = "de_blankable")]
    pub score: Option<f64>,
    /// Total sleep as "H:MM".
    pub total: Option<String>,
    /// Deep sleep minutes.
    #[serde(deserialize_with = "de_blankable")]
    pub deep: Option<f64>,
    /// REM sleep minutes.
    #[serde(deserialize_with = "de_blankable")]
    pub rem: Option<f64>,
}

impl Wearables {
    pub fn is_empty(&self) -> bool {
        self.score.is_none() && self.total.is_none() && self.deep.is_none() && self.rem.is_none()
    }
}

/// Advanced biometric set, all optional. Field names are the wire
/// names (bp_sys, bp_dia, rt) used since the first schema version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyMetrics {
    #[serde(deserialize_with = "de_blankable")]
    pub weight: Option<f64>,
    /// Resting heart rate, bpm.
    #[serde(deserialize_with = "de_blankable")]
    pub rhr: Option<f64>,
    /// Heart-rate variability (rMSSD), ms.
    #[serde(deserialize_with = "de_blankable")]
    pub hrv: Option<f64>,
    #[serde(deserialize_with = "de_blankable")]
    pub bp_sys: Option<f64>,
    #[serde(deserialize_with = "de_blankable")]
    pub bp_dia: Option<f64>,
    /// Reaction time, ms.
    #[serde(deserialize_with = "de_blankable")]
    pub rt: Option<f64>,
}

impl BodyMetrics {
    pub fn is_empty(&self) -> bool {
        self.weight.is_none()
            && self.rhr.is_none()
            && self.hrv.is_none()
            && self.bp_sys.is_none()
            && self.bp_dia.is_none()
            && self.rt.is_none()
    }
}

/// One day's check-in. The date is the natural key; no two logs share
/// a date. Created or replaced wholesale on every save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLog {
    pub date: String,
    pub took_dose: DoseTaken,
    /// Capsules taken; present only when `took_dose` is yes.
    #[serde(default, deserialize_with = "de_blankable")]
    pub dose_amount: Option<f64>,
    #[serde(default)]
    pub sliders: Sliders,
    #[serde(default, deserialize_with = "de_blankable")]
    pub wake_ups: Option<f64>,
    #[serde(default)]
    pub wearables: Wearables,
    #[serde(default)]
    pub metrics: BodyMetrics,
    #[serde(default)]
    pub notes: String,
}

impl DailyLog {
    /// An empty check-in for `date`: no dose, midpoint sliders.
    pub fn new(date: &str) -> Self {
        Self {
            date: date.to_string(),
            took_dose: DoseTaken::No,
            dose_amount: None,
            sliders: Sliders::default(),
            wake_ups: None,
            wearables: Wearables::default(),
            metrics: BodyMetrics::default(),
            notes: String::new(),
        }
    }
}

/// The full application state: plan plus the per-date log map.
///
/// BTreeMap keys are ISO dates, so iteration is ascending-date order,
/// the order every derived series and export relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppState {
    pub version: f64,
    pub plan: Plan,
    pub daily: BTreeMap<String, DailyLog>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            plan: Plan::default(),
            daily: BTreeMap::new(),
        }
    }
}
