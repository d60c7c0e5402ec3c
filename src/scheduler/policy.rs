use std::fmt;
use std::str::FromStr;

/// Worker count used when "agent" is requested without an explicit size.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Concurrency policy for a batch.
///
/// All three run through the same worker pool; they only differ in how many
/// workers it gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// One item at a time, in input order.
    Sequential,
    /// One worker per item, no bound.
    Parallel,
    /// A fixed number of workers pulling from a shared queue.
    BoundedPool(usize),
}

impl Policy {
    /// Number of workers to start for a batch of `batch_len` items.
    pub fn concurrency(&self, batch_len: usize) -> usize {
        let batch_len = batch_len.max(1);
        match *self {
            Policy::Sequential => 1,
            Policy::Parallel => batch_len,
            Policy::BoundedPool(workers) => workers.clamp(1, batch_len),
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::Sequential => f.write_str("Sync"),
            Policy::Parallel => f.write_str("Async"),
            Policy::BoundedPool(workers) => write!(f, "Agent ({workers} workers)"),
        }
    }
}

impl FromStr for Policy {
    type Err = String;

    /// Accepts `sync`, `async`, `agent` (and `sequential`, `parallel`,
    /// `pool`), with an optional `:<workers>` suffix for the pool.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let (name, workers) = match lowered.split_once(':') {
            Some((name, workers)) => (name, Some(workers)),
            None => (lowered.as_str(), None),
        };

        match (name, workers) {
            ("sync" | "sequential", None) => Ok(Policy::Sequential),
            ("async" | "parallel", None) => Ok(Policy::Parallel),
            ("agent" | "pool", None) => Ok(Policy::BoundedPool(DEFAULT_POOL_SIZE)),
            ("agent" | "pool", Some(workers)) => match workers.parse::<usize>() {
                Ok(n) if n > 0 => Ok(Policy::BoundedPool(n)),
                _ => Err(format!("invalid worker count: {workers:?}")),
            },
            _ => Err(format!("unknown policy: {s:?}")),
        }
    }
}
