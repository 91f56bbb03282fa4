/// Console + daily rolling JSON file subscriber setup.
pub mod tracing_setup;

pub use tracing_appender::non_blocking::WorkerGuard;
pub use tracing_setup::setup_logging;
