use std::fmt;
use std::thread;

/// How writes reach the disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// fsync after every append
    Strict,
    /// Leave flushing to the OS page cache
    Buffered,
}

impl Durability {
    pub fn is_strict(self) -> bool {
        self == Durability::Strict
    }
}

impl fmt::Display for Durability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Durability::Strict => write!(f, "Strict (Fsync)"),
            Durability::Buffered => write!(f, "High Throughput (Async)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SystemProfile {
    pub logical_cores: usize,
    pub worker_threads: usize,
    pub durability: Durability,
}

impl SystemProfile {
    pub fn detect() -> Self {
        let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self::for_cores(cores)
    }

    pub fn for_cores(cores: usize) -> Self {
        // Single core: one compute + one I/O thread, and no fsync per request
        if cores <= 1 {
            println!("[\u{26a0}\u{fe0f}  MANAGER] CPU Constraint Detected (Cores: {}).", cores);
            println!("             Enabling low-resource mode (No Fsync).");

            Self {
                logical_cores: cores,
                worker_threads: 2,
                durability: Durability::Buffered,
            }
        } else {
            Self {
                logical_cores: cores,
                worker_threads: cores,
                durability: Durability::Strict,
            }
        }
    }

    /// Applies command-line overrides on top of the detected profile.
    pub fn with_overrides(mut self, worker_threads: Option<usize>, buffered: bool) -> Self {
        if let Some(n) = worker_threads {
            self.worker_threads = n.max(1);
        }
        if buffered {
            self.durability = Durability::Buffered;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_core_drops_fsync() {
        let profile = SystemProfile::for_cores(1);
        assert_eq!(profile.worker_threads, 2);
        assert!(!profile.durability.is_strict());
    }

    #[test]
    fn multi_core_is_strict() {
        let profile = SystemProfile::for_cores(8);
        assert_eq!(profile.worker_threads, 8);
        assert!(profile.durability.is_strict());
    }

    #[test]
    fn overrides_apply() {
        let profile = SystemProfile::for_cores(8).with_overrides(Some(0), true);
        assert_eq!(profile.worker_threads, 1);
        assert_eq!(profile.durability, Durability::Buffered);
    }
}
