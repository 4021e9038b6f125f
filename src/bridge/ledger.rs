//! Acquire/release accounting for exported FFI structures.
//!
//! Every export takes a `Lease` from the call's `ExportLedger`. The lease moves
//! with the exported value and, once imported, is owned by the imported buffers
//! themselves. It records exactly one release when it is dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct LedgerCounts {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

/// Shared counters for one training call. Cloning shares the counters.
#[derive(Debug, Clone, Default)]
pub struct ExportLedger {
    counts: Arc<LedgerCounts>,
}

impl ExportLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquired(&self) -> usize {
        self.counts.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.counts.released.load(Ordering::SeqCst)
    }

    /// Exports that have not been released yet.
    pub fn outstanding(&self) -> usize {
        self.acquired().saturating_sub(self.released())
    }

    pub fn is_balanced(&self) -> bool {
        self.acquired() == self.released()
    }

    pub(crate) fn acquire(&self) -> Lease {
        self.counts.acquired.fetch_add(1, Ordering::SeqCst);
        Lease {
            counts: Arc::clone(&self.counts),
        }
    }
}

/// One outstanding export. Dropping it records the release.
#[derive(Debug)]
pub(crate) struct Lease {
    counts: Arc<LedgerCounts>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.counts.released.fetch_add(1, Ordering::SeqCst);
    }
}
