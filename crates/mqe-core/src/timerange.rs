//! Snapped, slot-indexed time windows.
//!
//! All quantities are milliseconds. A `Timerange` covers the closed interval
//! `[start, end]` sampled every `resolution` ms, so it always has at least one
//! slot. Derived ranges (`shift`, `extend_before`, `select_length`) are
//! re-snapped so the invariants survive arbitrary offsets.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimerange")]
pub struct Timerange {
    start: i64,
    end: i64,
    resolution: i64,
}

/// Unvalidated wire form; deserialization goes through `Timerange::new`.
#[derive(Deserialize)]
struct RawTimerange {
    start: i64,
    end: i64,
    resolution: i64,
}

impl TryFrom<RawTimerange> for Timerange {
    type Error = Error;

    fn try_from(raw: RawTimerange) -> Result<Self> {
        Timerange::new(raw.start, raw.end, raw.resolution)
    }
}

impl Timerange {
    /// Build a timerange whose bounds are already aligned to `resolution`.
    pub fn new(start: i64, end: i64, resolution: i64) -> Result<Self> {
        if resolution <= 0 {
            return Err(Error::Timerange(format!("invalid resolution {resolution}")));
        }
        if start % resolution != 0 {
            return Err(Error::Timerange(format!(
                "start % resolution (mod) must be 0 (start={start}, resolution={resolution})"
            )));
        }
        if end % resolution != 0 {
            return Err(Error::Timerange(format!(
                "end % resolution (mod) must be 0 (end={end}, resolution={resolution})"
            )));
        }
        if start > end {
            return Err(Error::Timerange(format!(
                "start must be <= end (start={start}, end={end})"
            )));
        }
        Ok(Self {
            start,
            end,
            resolution,
        })
    }

    /// Build a timerange, rounding both bounds to the nearest slot boundary.
    pub fn snapped(start: i64, end: i64, resolution: i64) -> Result<Self> {
        if resolution <= 0 {
            return Err(Error::Timerange(format!("invalid resolution {resolution}")));
        }
        if start > end {
            return Err(Error::Timerange(format!(
                "start must be <= end (start={start}, end={end})"
            )));
        }
        Ok(Self {
            start,
            end,
            resolution,
        }
        .snap())
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn resolution(&self) -> i64 {
        self.resolution
    }

    pub fn resolution_seconds(&self) -> f64 {
        self.resolution as f64 / 1000.0
    }

    /// Length of the window in ms (`end - start`).
    pub fn duration(&self) -> i64 {
        self.end - self.start
    }

    pub fn slots(&self) -> usize {
        ((self.end - self.start) / self.resolution) as usize + 1
    }

    /// Slot index of timestamp `t`. May be negative or `>= slots()` when `t`
    /// falls outside the window; callers bounds-check.
    pub fn index(&self, t: i64) -> i64 {
        (t - self.start).div_euclid(self.resolution)
    }

    /// Timestamp at the start of slot `slot`.
    pub fn timestamp(&self, slot: usize) -> i64 {
        self.start + slot as i64 * self.resolution
    }

    pub fn contains(&self, t: i64) -> bool {
        self.start <= t && t <= self.end
    }

    pub fn shift(&self, delta: i64) -> Self {
        Self {
            start: self.start + delta,
            end: self.end + delta,
            resolution: self.resolution,
        }
        .snap()
    }

    /// Move `start` earlier by `delta` ms, rounded to a whole number of slots.
    pub fn extend_before(&self, delta: i64) -> Self {
        Self {
            start: self.start - delta,
            end: self.end,
            resolution: self.resolution,
        }
        .snap()
    }

    /// Keep `start` and set the window length to `length` ms.
    pub fn select_length(&self, length: i64) -> Self {
        Self {
            start: self.start,
            end: self.start + length,
            resolution: self.resolution,
        }
        .snap()
    }

    /// Same bounds at a different resolution (snapped).
    pub fn with_resolution(&self, resolution: i64) -> Result<Self> {
        Self::snapped(self.start, self.end, resolution)
    }

    fn snap(mut self) -> Self {
        self.start = snap(self.start, self.resolution);
        self.end = snap(self.end, self.resolution);
        if self.end < self.start {
            self.end = self.start;
        }
        self
    }
}

/// Round `n` to the nearest multiple of `boundary`, halves away from zero.
fn snap(n: i64, boundary: i64) -> i64 {
    if n < 0 {
        return -snap(-n, boundary);
    }
    (n + boundary / 2) / boundary * boundary
}

impl std::fmt::Display for Timerange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}..{} @{}ms]", self.start, self.end, self.resolution)
    }
}
