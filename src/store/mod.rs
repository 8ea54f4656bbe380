//! The reconciling store: single authoritative in-memory AppState,
//! write-through local cache, best-effort remote mirroring.
//!
//! Local-first contract: every mutation commits to memory and the
//! local cache synchronously, then fires a detached remote upsert for
//! the changed entity. A failed mirror write is logged and never rolls
//! back local state. The remote resolves rapid writes to the same row
//! as last-write-wins.

pub mod local;
pub mod remote;

pub use local::LocalCache;
pub use remote::{
    HttpRemote, LogRow, MemoryRemote, ProfileRow, RemoteStore, Session, SessionProvider,
    StaticSessions,
};

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::TrialMateError;
use crate::ingest::{self, LogPatch};
use crate::model::{AppState, DailyLog, Plan, STATE_VERSION};

/// Owns the live AppState. All reads go through [`Store::state`]
/// snapshots and all writes through the mutator methods; nothing else
/// in the crate holds mutable state.
///
/// Single-writer by construction: mutators take `&mut self`, so one
/// owner serializes all mutations, matching the one-UI-writer model.
pub struct Store {
    state: AppState,
    cache: LocalCache,
    remote: Arc<dyn RemoteStore>,
    sessions: Arc<dyn SessionProvider>,
}

impl Store {
    /// Run startup resolution to completion and return a ready store.
    ///
    /// Resolution order: with an active session, remote content is
    /// authoritative whenever any exists; an authenticated-but-empty
    /// remote falls back to the local cache, as does the signed-out
    /// case; defaults otherwise. A store value existing *is* the ready
    /// signal; there is no way to read fields mid-load.
    ///
    /// Known hazard, kept deliberately: remote-if-nonempty wins with no
    /// timestamp comparison, so stale remote rows from an old session
    /// shadow newer offline-only local edits.
    pub async fn open(
        cache: LocalCache,
        remote: Arc<dyn RemoteStore>,
        sessions: Arc<dyn SessionProvider>,
    ) -> Result<Self, TrialMateError> {
        let state = match sessions.current_session() {
            Some(session) => match Self::load_remote(remote.as_ref(), &session).await {
                Ok(Some(state)) => {
                    info!(
                        "Loaded state from remote: {} daily logs",
                        state.daily.len()
                    );
                    state
                }
                Ok(None) => {
                    info!("Remote is empty, falling back to local cache");
                    Self::load_local(&cache)
                }
                Err(e) => {
                    warn!("Remote load failed, falling back to local cache: {}", e);
                    Self::load_local(&cache)
                }
            },
            None => Self::load_local(&cache),
        };

        Ok(Self {
            state,
            cache,
            remote,
            sessions,
        })
    }

    /// Fetch the profile row and log rows for the session user.
    /// Returns None when the remote holds nothing for this user.
    async fn load_remote(
        remote: &dyn RemoteStore,
        session: &Session,
    ) -> Result<Option<AppState>, TrialMateError> {
        let profile = remote.fetch_profile(&session.user_id).await?;
        let logs = remote.fetch_logs(&session.user_id).await?;

        if profile.is_none() && logs.is_empty() {
            return Ok(None);
        }

        let plan = match profile {
            Some(row) => row.into_plan(&session.email),
            None => Plan {
                participant_email: session.email.clone(),
                ..Plan::default()
            },
        };

        let mut daily = BTreeMap::new();
        for row in logs {
            let log = row.into_log();
            daily.insert(log.date.clone(), log);
        }

        Ok(Some(AppState {
            version: STATE_VERSION,
            plan,
            daily,
        }))
    }

    fn load_local(cache: &LocalCache) -> AppState {
        match cache.load() {
            Ok(Some(state)) => {
                info!("Loaded state from local cache: {} daily logs", state.daily.len());
                state
            }
            Ok(None) => AppState::default(),
            Err(e) => {
                warn!("Local cache unreadable, starting from defaults: {}", e);
                AppState::default()
            }
        }
    }

    /// Read-only snapshot of the current state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Replace the Plan wholesale and commit.
    ///
    /// Must be called inside a tokio runtime; the remote mirror runs as
    /// a detached task that the mutator never waits on.
    pub fn update_plan(&mut self, plan: Plan) -> Result<(), TrialMateError> {
        self.state.plan = plan.clone();
        self.state.version = STATE_VERSION;
        self.cache.save(&self.state)?;
        self.mirror_profile(plan);
        Ok(())
    }

    /// Insert or replace the daily log for its date and commit.
    pub fn update_daily(&mut self, log: DailyLog) -> Result<(), TrialMateError> {
        self.state.daily.insert(log.date.clone(), log.clone());
        self.cache.save(&self.state)?;
        self.mirror_log(log);
        Ok(())
    }

    /// Apply CSV-derived partial patches (see [`crate::ingest`]).
    /// Each merged log goes through [`Store::update_daily`].
    /// Returns the number of days touched.
    pub fn apply_patches(
        &mut self,
        patches: &BTreeMap<String, LogPatch>,
    ) -> Result<usize, TrialMateError> {
        for (date, patch) in patches {
            let merged = patch.apply_to(self.state.daily.get(date), date);
            self.update_daily(merged)?;
        }
        Ok(patches.len())
    }

    /// Parse CSV text and apply the resulting patches.
    pub fn import_csv(&mut self, text: &str) -> Result<usize, TrialMateError> {
        let patches = ingest::parse_csv(text);
        self.apply_patches(&patches)
    }

    /// Merge an imported full-state payload: every daily log in the
    /// payload is upserted wholesale (full replace per date) through
    /// the same mutator manual saves use. The imported plan is not
    /// applied. Returns the number of logs imported.
    pub fn import_state(&mut self, imported: AppState) -> Result<usize, TrialMateError> {
        let mut count = 0;
        for (_, log) in imported.daily {
            self.update_daily(log)?;
            count += 1;
        }
        Ok(count)
    }

    /// Wipe everything back to defaults.
    ///
    /// The caller must have collected explicit user confirmation first.
    /// With a session, remote deletes are issued (and awaited) before
    /// the local wipe; their failures are logged only, and the local reset
    /// always proceeds and is never retried against the remote.
    pub async fn reset(&mut self) -> Result<(), TrialMateError> {
        if let Some(session) = self.sessions.current_session() {
            if let Err(e) = self.remote.delete_all_logs(&session.user_id).await {
                warn!("Remote log delete failed during reset: {}", e);
            }
            if let Err(e) = self.remote.delete_profile(&session.user_id).await {
                warn!("Remote profile delete failed during reset: {}", e);
            }
        }

        self.cache.clear()?;
        self.state = AppState::default();
        info!("State reset to defaults");
        Ok(())
    }

    /// Fire-and-forget upsert of the profile row.
    fn mirror_profile(&self, plan: Plan) {
        let Some(session) = self.sessions.current_session() else {
            return;
        };
        let row = ProfileRow::from_plan(&session.user_id, &plan);
        let remote = Arc::clone(&self.remote);
        tokio::spawn(async move {
            if let Err(e) = remote.upsert_profile(row).await {
                warn!("Profile mirror failed, local state kept: {}", e);
            }
        });
    }

    /// Fire-and-forget upsert of one log row keyed by (user, date).
    fn mirror_log(&self, log: DailyLog) {
        let Some(session) = self.sessions.current_session() else {
            return;
        };
        let row = LogRow::from_log(&session.user_id, &log);
        let remote = Arc::clone(&self.remote);
        tokio::spawn(async move {
            if let Err(e) = remote.upsert_log(row).await {
                warn!("Log mirror failed, local state kept: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DoseTaken;

    fn session() -> Session {
        Session {
            user_id: "user-1".to_string(),
            email: "ada@example.com".to_string(),
        }
    }

    fn signed_in() -> Arc<dyn SessionProvider> {
        Arc::new(StaticSessions(Some(session())))
    }

    fn signed_out() -> Arc<dyn SessionProvider> {
        Arc::new(StaticSessions(None))
    }

    #[tokio::test]
    async fn test_open_defaults_when_nothing_exists() {
        let store = Store::open(
            LocalCache::in_memory().unwrap(),
            Arc::new(MemoryRemote::new()),
            signed_out(),
        )
        .await
        .unwrap();

        assert_eq!(*store.state(), AppState::default());
    }

    #[tokio::test]
    async fn test_open_prefers_local_cache_when_signed_out() {
        let cache = LocalCache::in_memory().unwrap();
        let mut cached = AppState::default();
        cached.plan.participant_name = "Local Ada".to_string();
        cache.save(&cached).unwrap();

        let store = Store::open(cache, Arc::new(MemoryRemote::new()), signed_out())
            .await
            .unwrap();

        assert_eq!(store.state().plan.participant_name, "Local Ada");
    }

    #[tokio::test]
    async fn test_open_remote_wins_over_local_cache() {
        let cache = LocalCache::in_memory().unwrap();
        let mut cached = AppState::default();
        cached.plan.participant_name = "Local Ada".to_string();
        cache.save(&cached).unwrap();

        let remote = Arc::new(MemoryRemote::new());
        let mut remote_plan = Plan::default();
        remote_plan.participant_name = "Remote Ada".to_string();
        remote.seed_profile(ProfileRow::from_plan("user-1", &remote_plan));
        remote.seed_log(LogRow::from_log("user-1", &DailyLog::new("2024-01-03")));

        let store = Store::open(cache, remote, signed_in()).await.unwrap();

        assert_eq!(store.state().plan.participant_name, "Remote Ada");
        assert_eq!(store.state().daily.len(), 1);
        assert!(store.state().daily.contains_key("2024-01-03"));
    }

    #[tokio::test]
    async fn test_open_empty_remote_falls_back_to_local() {
        let cache = LocalCache::in_memory().unwrap();
        let mut cached = AppState::default();
        cached.plan.participant_name = "Local Ada".to_string();
        cache.save(&cached).unwrap();

        let store = Store::open(cache, Arc::new(MemoryRemote::new()), signed_in())
            .await
            .unwrap();

        assert_eq!(store.state().plan.participant_name, "Local Ada");
    }

    #[tokio::test]
    async fn test_logs_without_profile_still_load_with_session_email() {
        let remote = Arc::new(MemoryRemote::new());
        remote.seed_log(LogRow::from_log("user-1", &DailyLog::new("2024-01-03")));

        let store = Store::open(LocalCache::in_memory().unwrap(), remote, signed_in())
            .await
            .unwrap();

        assert_eq!(store.state().daily.len(), 1);
        assert_eq!(store.state().plan.participant_email, "ada@example.com");
    }

    #[tokio::test]
    async fn test_update_daily_commits_locally_without_session() {
        let mut store = Store::open(
            LocalCache::in_memory().unwrap(),
            Arc::new(MemoryRemote::new()),
            signed_out(),
        )
        .await
        .unwrap();

        let mut log = DailyLog::new("2024-02-10");
        log.took_dose = DoseTaken::Yes;
        log.dose_amount = Some(3.0);
        store.update_daily(log).unwrap();

        assert_eq!(store.state().daily.len(), 1);
        let reloaded = store.cache.load().unwrap().unwrap();
        assert_eq!(reloaded.daily.len(), 1);
    }

    #[tokio::test]
    async fn test_csv_import_merges_into_existing_log() {
        let mut store = Store::open(
            LocalCache::in_memory().unwrap(),
            Arc::new(MemoryRemote::new()),
            signed_out(),
        )
        .await
        .unwrap();

        let mut log = DailyLog::new("2024-01-05");
        log.took_dose = DoseTaken::Yes;
        log.notes = "gym day".to_string();
        store.update_daily(log).unwrap();

        let n = store
            .import_csv("Date,Resting Heart Rate,HRV,Sleep Score\n2024-01-05,55,62,88\n")
            .unwrap();
        assert_eq!(n, 1);

        let merged = &store.state().daily["2024-01-05"];
        assert_eq!(merged.metrics.rhr, Some(55.0));
        assert_eq!(merged.wearables.score, Some(88.0));
        assert_eq!(merged.took_dose, DoseTaken::Yes);
        assert_eq!(merged.notes, "gym day");
    }

    #[tokio::test]
    async fn test_reset_clears_local_and_remote() {
        let remote = Arc::new(MemoryRemote::new());
        remote.seed_profile(ProfileRow::from_plan("user-1", &Plan::default()));
        remote.seed_log(LogRow::from_log("user-1", &DailyLog::new("2024-01-03")));

        let mut store = Store::open(
            LocalCache::in_memory().unwrap(),
            Arc::clone(&remote) as Arc<dyn RemoteStore>,
            signed_in(),
        )
        .await
        .unwrap();
        assert_eq!(store.state().daily.len(), 1);

        store.reset().await.unwrap();

        assert_eq!(*store.state(), AppState::default());
        assert!(store.cache.load().unwrap().is_none());
        assert_eq!(remote.log_count("user-1"), 0);
        assert!(remote.profile("user-1").is_none());
    }
}
