//! Undoing conversions: sessions, the engine that walks the ledger, and the
//! reporter that keeps operators informed while it runs.
mod engine;
mod progress;
mod session;

pub use engine::{RestorationEngine, BATCH_SIZE, REGION_TIMEOUT};
pub use progress::{format_duration, ProgressReporter, Update, CHECK_PERIOD_TICKS, TIME_INTERVAL};
pub use session::RestorationSession;
