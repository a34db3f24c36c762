//! Batch reconciliation between Canto and the local store.

pub mod tagging;
pub mod taxonomy;

/// Counts of a batch run where individual items may fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
  pub processed: usize,
  pub failed: usize,
}

impl BatchSummary {
  pub fn record(&mut self, failed: bool) {
    self.processed += 1;
    if failed {
      self.failed += 1;
    }
  }
}
