//! Remote mirroring: identity sessions, snake_case row schemas and the
//! table-store client.
//!
//! The remote is a PostgREST-style table API with two collections: one
//! `profiles` row per user and one `daily_logs` row per (user, date).
//! Both are modeled behind traits so the reconciling store can run
//! against the real HTTP backend, an in-memory fake in tests, or
//! nothing at all when the participant never signs in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::TrialMateError;
use crate::model::{
    BodyMetrics, DailyLog, DoseTaken, Estimates, Mode, Plan, Reminders, Sliders, Wearables,
};

/// An authenticated identity-provider session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub email: String,
}

/// Source of "is there a session, and what is the user id."
///
/// The login flow itself (passwordless one-time code) lives in the
/// identity provider; the engine only ever asks for the current session.
pub trait SessionProvider: Send + Sync {
    fn current_session(&self) -> Option<Session>;
}

/// A provider with a fixed answer. Covers both the signed-out case
/// (`None`) and tests that need a stable user.
pub struct StaticSessions(pub Option<Session>);

impl SessionProvider for StaticSessions {
    fn current_session(&self) -> Option<Session> {
        self.0.clone()
    }
}

/// The per-user profile row, mirroring Plan with snake_case columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRow {
    pub id: String,
    #[serde(default)]
    pub participant_name: Option<String>,
    #[serde(default)]
    pub participant_email: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub product_version: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub baseline_days: Option<u32>,
    #[serde(default)]
    pub dose_notes: Option<String>,
    #[serde(default)]
    pub default_dose: Option<f64>,
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub estimates: Option<Estimates>,
    #[serde(default)]
    pub reminders: Option<Reminders>,
}

impl ProfileRow {
    pub fn from_plan(user_id: &str, plan: &Plan) -> Self {
        Self {
            id: user_id.to_string(),
            participant_name: Some(plan.participant_name.clone()),
            participant_email: Some(plan.participant_email.clone()),
            product_name: Some(plan.product_name.clone()),
            product_version: Some(plan.product_version.clone()),
            start_date: Some(plan.start_date.clone()),
            baseline_days: Some(plan.baseline_days),
            dose_notes: Some(plan.dose_notes.clone()),
            default_dose: Some(plan.default_dose),
            mode: Some(plan.mode),
            estimates: Some(plan.estimates.clone()),
            reminders: Some(plan.reminders.clone()),
        }
    }

    /// Rebuild a Plan, falling back field-by-field to defaults for
    /// columns the row doesn't carry. The participant email falls back
    /// to the session email before the (empty) default.
    pub fn into_plan(self, session_email: &str) -> Plan {
        let d = Plan::default();
        Plan {
            participant_name: self.participant_name.unwrap_or(d.participant_name),
            participant_email: self
                .participant_email
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| session_email.to_string()),
            product_name: self.product_name.unwrap_or(d.product_name),
            product_version: self.product_version.unwrap_or(d.product_version),
            start_date: self.start_date.unwrap_or(d.start_date),
            baseline_days: self.baseline_days.unwrap_or(d.baseline_days),
            dose_notes: self.dose_notes.unwrap_or(d.dose_notes),
            default_dose: self.default_dose.unwrap_or(d.default_dose),
            mode: self.mode.unwrap_or(d.mode),
            estimates: self.estimates.unwrap_or(d.estimates),
            reminders: self.reminders.unwrap_or(d.reminders),
        }
    }
}

/// One daily-log row per (user, date), mirroring DailyLog with
/// snake_case columns and the renamed dose/wake-up fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRow {
    pub user_id: String,
    pub date: String,
    pub took_dose: DoseTaken,
    #[serde(default)]
    pub dose_amount: Option<f64>,
    #[serde(default)]
    pub sliders: Sliders,
    #[serde(default)]
    pub wake_ups: Option<f64>,
    #[serde(default)]
    pub wearables: Wearables,
    #[serde(default)]
    pub metrics: BodyMetrics,
    #[serde(default)]
    pub notes: String,
}

impl LogRow {
    pub fn from_log(user_id: &str, log: &DailyLog) -> Self {
        Self {
            user_id: user_id.to_string(),
            date: log.date.clone(),
            took_dose: log.took_dose,
            dose_amount: log.dose_amount,
            sliders: log.sliders.clone(),
            wake_ups: log.wake_ups,
            wearables: log.wearables.clone(),
            metrics: log.metrics.clone(),
            notes: log.notes.clone(),
        }
    }

    pub fn into_log(self) -> DailyLog {
        DailyLog {
            date: self.date,
            took_dose: self.took_dose,
            dose_amount: self.dose_amount,
            sliders: self.sliders,
            wake_ups: self.wake_ups,
            wearables: self.wearables,
            metrics: self.metrics,
            notes: self.notes,
        }
    }
}

/// The remote durable store: upsert/delete/query, keyed by user id
/// (profiles) and (user id, date) (logs). Last-write-wins per row.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<ProfileRow>, TrialMateError>;
    async fn fetch_logs(&self, user_id: &str) -> Result<Vec<LogRow>, TrialMateError>;
    async fn upsert_profile(&self, row: ProfileRow) -> Result<(), TrialMateError>;
    async fn upsert_log(&self, row: LogRow) -> Result<(), TrialMateError>;
    async fn delete_profile(&self, user_id: &str) -> Result<(), TrialMateError>;
    async fn delete_all_logs(&self, user_id: &str) -> Result<(), TrialMateError>;
}

/// HTTP client for a PostgREST-style table API.
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl HttpRemote {
    /// `base_url` is the API root, e.g. `https://xyz.example.co/rest/v1/`.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, TrialMateError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| TrialMateError::Remote(format!("Invalid remote URL '{}': {}", base_url, e)))?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self, table: &str) -> Result<Url, TrialMateError> {
        self.base_url
            .join(table)
            .map_err(|e| TrialMateError::Remote(format!("Failed to build endpoint: {}", e)))
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<ProfileRow>, TrialMateError> {
        let mut url = self.endpoint("profiles")?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{}", user_id))
            .append_pair("select", "*");

        let rows: Vec<ProfileRow> = self
            .authed(self.client.get(url))
            .send()
            .await
            .map_err(|e| TrialMateError::Remote(format!("Profile fetch failed: {}", e)))?
            .error_for_status()
            .map_err(|e| TrialMateError::Remote(format!("Profile fetch failed: {}", e)))?
            .json()
            .await
            .map_err(|e| TrialMateError::Remote(format!("Profile response malformed: {}", e)))?;

        Ok(rows.into_iter().next())
    }

    async fn fetch_logs(&self, user_id: &str) -> Result<Vec<LogRow>, TrialMateError> {
        let mut url = self.endpoint("daily_logs")?;
        url.query_pairs_mut()
            .append_pair("user_id", &format!("eq.{}", user_id))
            .append_pair("select", "*");

        self.authed(self.client.get(url))
            .send()
            .await
            .map_err(|e| TrialMateError::Remote(format!("Log fetch failed: {}", e)))?
            .error_for_status()
            .map_err(|e| TrialMateError::Remote(format!("Log fetch failed: {}", e)))?
            .json()
            .await
            .map_err(|e| TrialMateError::Remote(format!("Log response malformed: {}", e)))
    }

    async fn upsert_profile(&self, row: ProfileRow) -> Result<(), TrialMateError> {
        let url = self.endpoint("profiles")?;
        self.authed(self.client.post(url))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&[row])
            .send()
            .await
            .map_err(|e| TrialMateError::Remote(format!("Profile upsert failed: {}", e)))?
            .error_for_status()
            .map_err(|e| TrialMateError::Remote(format!("Profile upsert failed: {}", e)))?;
        Ok(())
    }

    async fn upsert_log(&self, row: LogRow) -> Result<(), TrialMateError> {
        let mut url = self.endpoint("daily_logs")?;
        url.query_pairs_mut()
            .append_pair("on_conflict", "user_id,date");

        self.authed(self.client.post(url))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&[row])
            .send()
            .await
            .map_err(|e| TrialMateError::Remote(format!("Log upsert failed: {}", e)))?
            .error_for_status()
            .map_err(|e| TrialMateError::Remote(format!("Log upsert failed: {}", e)))?;
        Ok(())
    }

    async fn delete_profile(&self, user_id: &str) -> Result<(), TrialMateError> {
        let mut url = self.endpoint("profiles")?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{}", user_id));

        self.authed(self.client.delete(url))
            .send()
            .await
            .map_err(|e| TrialMateError::Remote(format!("Profile delete failed: {}", e)))?
            .error_for_status()
            .map_err(|e| TrialMateError::Remote(format!("Profile delete failed: {}", e)))?;
        Ok(())
    }

    async fn delete_all_logs(&self, user_id: &str) -> Result<(), TrialMateError> {
        let mut url = self.endpoint("daily_logs")?;
        url.query_pairs_mut()
            .append_pair("user_id", &format!("eq.{}", user_id));

        self.authed(self.client.delete(url))
            .send()
            .await
            .map_err(|e| TrialMateError::Remote(format!("Log delete failed: {}", e)))?
            .error_for_status()
            .map_err(|e| TrialMateError::Remote(format!("Log delete failed: {}", e)))?;
        Ok(())
    }
}

/// In-memory remote for tests and offline development. Same
/// upsert/delete semantics as the table API, minus the network.
#[derive(Default)]
pub struct MemoryRemote {
    inner: std::sync::Mutex<MemoryTables>,
}

#[derive(Default)]
struct MemoryTables {
    profiles: std::collections::HashMap<String, ProfileRow>,
    logs: std::collections::HashMap<(String, String), LogRow>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a profile row, bypassing the trait (test setup).
    pub fn seed_profile(&self, row: ProfileRow) {
        self.inner.lock().unwrap().profiles.insert(row.id.clone(), row);
    }

    /// Seed a log row, bypassing the trait (test setup).
    pub fn seed_log(&self, row: LogRow) {
        self.inner
            .lock()
            .unwrap()
            .logs
            .insert((row.user_id.clone(), row.date.clone()), row);
    }

    pub fn log_count(&self, user_id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .logs
            .keys()
            .filter(|(u, _)| u == user_id)
            .count()
    }

    pub fn profile(&self, user_id: &str) -> Option<ProfileRow> {
        self.inner.lock().unwrap().profiles.get(user_id).cloned()
    }

    pub fn log(&self, user_id: &str, date: &str) -> Option<LogRow> {
        self.inner
            .lock()
            .unwrap()
            .logs
            .get(&(user_id.to_string(), date.to_string()))
            .cloned()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch_profile(&self, user_id: &str) -> Result<Option<ProfileRow>, TrialMateError> {
        Ok(self.inner.lock().unwrap().profiles.get(user_id).cloned())
    }

    async fn fetch_logs(&self, user_id: &str) -> Result<Vec<LogRow>, TrialMateError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .logs
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn upsert_profile(&self, row: ProfileRow) -> Result<(), TrialMateError> {
        self.inner.lock().unwrap().profiles.insert(row.id.clone(), row);
        Ok(())
    }

    async fn upsert_log(&self, row: LogRow) -> Result<(), TrialMateError> {
        self.inner
            .lock()
            .unwrap()
            .logs
            .insert((row.user_id.clone(), row.date.clone()), row);
        Ok(())
    }

    async fn delete_profile(&self, user_id: &str) -> Result<(), TrialMateError> {
        self.inner.lock().unwrap().profiles.remove(user_id);
        Ok(())
    }

    async fn delete_all_logs(&self, user_id: &str) -> Result<(), TrialMateError> {
        self.inner
            .lock()
            .unwrap()
            .logs
            .retain(|(u, _), _| u != user_id);
        Ok(())
    }
}
