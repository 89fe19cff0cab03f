//! Adaptive batch sizing.
//!
//! The provider caps how many symbols one request may carry, and the cap is not
//! published. The planner discovers it per group: probe the first N symbols,
//! halve N on any error, stop at the first success. N starts at the smaller of
//! the ceiling and the group size and never grows within a group.

use std::fmt::Display;

use thiserror::Error;
use trendscan_core::config::SyncConfig;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("batch size collapsed: {probes} probes failed down to size {floor} (last error: {last_error})")]
    Collapsed {
        floor: usize,
        probes: usize,
        last_error: String,
    },
}

/// Discovered batch size for one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    pub size: usize,
    /// Probe requests issued, the successful one included.
    pub probes: usize,
}

impl BatchPlan {
    /// Number of batches needed to cover `group_len` symbols.
    pub fn batch_count(&self, group_len: usize) -> usize {
        group_len.div_ceil(self.size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlanner {
    ceiling: usize,
    floor: usize,
}

impl BatchPlanner {
    pub fn new(ceiling: usize, floor: usize) -> Self {
        let floor = floor.max(1);
        Self {
            ceiling: ceiling.max(floor),
            floor,
        }
    }

    pub fn from_config(sync: &SyncConfig) -> Self {
        Self::new(sync.batch_ceiling, sync.batch_floor)
    }

    pub fn floor(&self) -> usize {
        self.floor
    }

    /// Find the largest workable size for a group of `group_len` symbols.
    ///
    /// `probe(n)` issues one request for the group's first `n` symbols.
    pub fn plan<E, F>(&self, group_len: usize, mut probe: F) -> Result<BatchPlan, PlanError>
    where
        E: Display,
        F: FnMut(usize) -> Result<(), E>,
    {
        let mut size = self.ceiling.min(group_len).max(self.floor);
        let mut probes = 0;
        loop {
            probes += 1;
            match probe(size) {
                Ok(()) => {
                    tracing::debug!(size, probes, "batch size found");
                    return Ok(BatchPlan { size, probes });
                }
                Err(e) if size <= self.floor => {
                    return Err(PlanError::Collapsed {
                        floor: self.floor,
                        probes,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => {
                    let next = (size / 2).max(self.floor);
                    tracing::debug!(size, next, error = %e, "probe failed, halving batch size");
                    size = next;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halves_until_success() {
        let planner = BatchPlanner::new(1000, 1);
        let mut seen = Vec::new();
        let plan = planner
            .plan(1000, |n| {
                seen.push(n);
                if n > 250 {
                    Err("too many symbols")
                } else {
                    Ok(())
                }
            })
            .unwrap();
        assert_eq!(seen, vec![1000, 500, 250]);
        assert_eq!(plan, BatchPlan { size: 250, probes: 3 });
        assert_eq!(plan.batch_count(1000), 4);
    }

    #[test]
    fn starts_at_group_size() {
        let planner = BatchPlanner::new(1000, 1);
        let plan = planner.plan(37, |_| Ok::<(), String>(())).unwrap();
        assert_eq!(plan, BatchPlan { size: 37, probes: 1 });
        assert_eq!(plan.batch_count(37), 1);
    }

    #[test]
    fn collapses_at_floor() {
        let planner = BatchPlanner::new(8, 1);
        let mut seen = Vec::new();
        let err = planner
            .plan(8, |n| {
                seen.push(n);
                Err::<(), _>("boom")
            })
            .unwrap_err();
        assert_eq!(seen, vec![8, 4, 2, 1]);
        let PlanError::Collapsed { floor, probes, last_error } = err;
        assert_eq!((floor, probes), (1, 4));
        assert_eq!(last_error, "boom");
    }

    #[test]
    fn floor_above_one_is_respected() {
        let planner = BatchPlanner::new(100, 30);
        let mut seen = Vec::new();
        let _ = planner.plan(100, |n| {
            seen.push(n);
            Err::<(), _>("no")
        });
        assert_eq!(seen, vec![100, 50, 30]);
    }

    #[test]
    fn uneven_tail_batch_counts() {
        assert_eq!(BatchPlan { size: 250, probes: 1 }.batch_count(1001), 5);
    }
}
