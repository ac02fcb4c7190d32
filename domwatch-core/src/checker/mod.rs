mod pool;
mod scheduler;

pub use pool::{CheckerPool, CycleOutcome, CycleSummary, DEFAULT_CYCLE_TIMEOUT};
pub use scheduler::Scheduler;
