//! Monitor counters and the detection interval gate.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::detection::ViolationType;

/// Mutable state of a monitoring session.
#[derive(Debug)]
pub struct MonitorState {
    frame_count: u64,
    analyses: u64,
    violations: BTreeMap<ViolationType, u64>,
    last_detection: Instant,
    interval: Duration,
}

impl MonitorState {
    /// Starts a session; the first analysis happens once `interval` has passed since `started`.
    #[must_use]
    pub const fn new(interval: Duration, started: Instant) -> Self {
        Self {
            frame_count: 0,
            analyses: 0,
            violations: BTreeMap::new(),
            last_detection: started,
            interval,
        }
    }

    /// Counts a received frame.
    pub fn record_frame(&mut self) -> u64 {
        self.frame_count += 1;
        self.frame_count
    }

    /// Checks whether the frame seen at `now` should be analysed.
    #[must_use]
    pub fn is_detection_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_detection) >= self.interval
    }

    /// Records an analysis. The interval restarts only when violations were found.
    pub fn record_analysis(&mut self, now: Instant, found: &[ViolationType]) {
        self.analyses += 1;
        if found.is_empty() {
            return;
        }

        self.last_detection = now;
        for kind in found {
            *self.violations.entry(*kind).or_default() += 1;
        }
    }

    #[must_use]
    pub fn summary(&self) -> MonitorSummary {
        MonitorSummary {
            frames: self.frame_count,
            analyses: self.analyses,
            violations: self.violations.clone(),
        }
    }
}

/// Totals reported when monitoring stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorSummary {
    pub frames: u64,
    pub analyses: u64,
    pub violations: BTreeMap<ViolationType, u64>,
}

impl MonitorSummary {
    #[must_use]
    pub fn total_violations(&self) -> u64 {
        self.violations.values().sum()
    }
}

impl fmt::Display for MonitorSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames, {} analyses, {} violations",
            self.frames,
            self.analyses,
            self.total_violations()
        )?;
        for (kind, count) in &self.violations {
            write!(f, ", {kind}: {count}")?;
        }
        Ok(())
    }
}
