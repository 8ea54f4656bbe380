//! TrialMate: the state engine behind a personal supplement-trial
//! tracker. Owns the plan + daily-log entity model, the local-first
//! reconciling store, baseline/treatment analytics, CSV wearable
//! ingestion, and the export/import codec. Rendering, navigation and
//! the sign-in screen live in the frontend and only ever call through
//! [`store::Store`].

pub mod analytics;
mod error;
pub mod export;
pub mod ingest;
pub mod model;
pub mod store;
pub mod timeutil;

pub use error::TrialMateError;
pub use model::{AppState, DailyLog, DoseTaken, Estimates, Mode, Plan, Reminders, Sliders};
pub use store::{LocalCache, RemoteStore, Session, SessionProvider, Store};

/// Initialize tracing for binaries and examples embedding the engine.
/// Defaults to `info` unless `RUST_LOG` says otherwise.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
