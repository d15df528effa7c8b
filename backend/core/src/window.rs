//! Window identifiers and their wall-clock mapping.
//!
//! A window id packs the epoch-seconds base in its upper 32 bits and a
//! per-base sequence number in its lower 32 bits.

use std::fmt;

use serde::{Deserialize, Serialize};

const SEQUENCE_MASK: u64 = 0xFFFF_FFFF;

/// Default streaming window width, in milliseconds.
pub const DEFAULT_WINDOW_WIDTH_MILLIS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(u64);

impl WindowId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn from_parts(base_seconds: u32, sequence: u32) -> Self {
        Self((u64::from(base_seconds) << 32) | u64::from(sequence))
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn base_seconds(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn sequence(self) -> u32 {
        (self.0 & SEQUENCE_MASK) as u32
    }
}

impl From<u64> for WindowId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<WindowId> for u64 {
    fn from(window: WindowId) -> Self {
        window.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Converts window ids to wall-clock milliseconds for one application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowClock {
    pub first_window_millis: i64,
    pub window_width_millis: u64,
}

impl WindowClock {
    pub fn new(first_window_millis: i64, window_width_millis: u64) -> Self {
        Self { first_window_millis, window_width_millis }
    }

    /// Start time of `window`. Bases earlier than the application's first
    /// window are clamped to it.
    pub fn to_millis(&self, window: WindowId) -> i64 {
        let base = i64::from(window.base_seconds()) * 1000;
        let base = base.max(self.first_window_millis);
        let width = i64::try_from(self.window_width_millis).unwrap_or(i64::MAX);
        let offset = i64::from(window.sequence()).saturating_mul(width);
        base.saturating_add(offset)
    }
}

impl Default for WindowClock {
    fn default() -> Self {
        Self::new(0, DEFAULT_WINDOW_WIDTH_MILLIS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_base_and_sequence() {
        let w = WindowId::from_parts(1_700_000_000, 12);
        assert_eq!(w.base_seconds(), 1_700_000_000);
        assert_eq!(w.sequence(), 12);
        assert_eq!(WindowId::new(w.value()), w);
    }

    #[test]
    fn millis_from_base_and_width() {
        let clock = WindowClock::new(0, 500);
        let w = WindowId::from_parts(1_000, 4);
        assert_eq!(clock.to_millis(w), 1_000_000 + 2_000);
    }

    #[test]
    fn base_clamped_to_first_window() {
        let clock = WindowClock::new(5_000, 250);
        assert_eq!(clock.to_millis(WindowId::from_parts(1, 2)), 5_500);
    }

    #[test]
    fn display_is_hex() {
        assert_eq!(WindowId::new(255).to_string(), "0xff");
    }

    #[test]
    fn oversized_width_saturates_instead_of_wrapping() {
        let clock = WindowClock::new(0, u64::MAX);
        assert_eq!(clock.to_millis(WindowId::from_parts(0, 1)), i64::MAX);
        assert_eq!(clock.to_millis(WindowId::from_parts(2, 0)), 2000);
    }
}
