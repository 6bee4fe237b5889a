use crate::portal::schedule::MatchConfig;
use core::fmt;
use std::time::Duration;
use time::{Date, OffsetDateTime, UtcOffset};

/// Phase of play, derived from the wall clock alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    NotStarted,
    /// 1-based half number.
    Half(u8),
    Break,
    FullTime,
}

impl MatchPhase {
    pub fn is_playing(self) -> bool {
        matches!(self, Self::Half(_))
    }

    pub fn half_number(self) -> Option<u8> {
        match self {
            Self::Half(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MatchPhase::NotStarted => write!(f, "Not Started"),
            MatchPhase::Half(1) => write!(f, "First Half"),
            MatchPhase::Half(2) => write!(f, "Second Half"),
            MatchPhase::Half(n) => write!(f, "Half {n}"),
            MatchPhase::Break => write!(f, "Half Time"),
            MatchPhase::FullTime => write!(f, "Full Time"),
        }
    }
}

/// Recomputed every tick from absolute time; never persisted, so suspension
/// and resume self-correct without drift.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockState {
    pub phase: MatchPhase,
    pub elapsed: Duration,
    /// Fraction of the match completed, in `[0, 1]`, rounded to 2 digits.
    pub progress: f32,
}

impl ClockState {
    pub fn elapsed_display(&self) -> String {
        format_elapsed(self.elapsed)
    }
}

/// Whole seconds, floor-truncated, as `HH:MM:SS`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

/// Pure function of (now, match configuration). Half `i` (0-based) occupies
/// `[i*(half+break), i*(half+break)+half)`; the break after half `i` fills
/// the remainder up to the next half's start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchClock {
    start: OffsetDateTime,
    half_duration: Duration,
    break_duration: Duration,
    half_count: u8,
}

impl MatchClock {
    pub fn new(
        start: OffsetDateTime,
        half_duration: Duration,
        break_duration: Duration,
        half_count: u8,
    ) -> Self {
        Self {
            start,
            half_duration,
            break_duration,
            half_count,
        }
    }

    /// The config carries times of day; the session date supplies the day.
    pub fn from_config(config: &MatchConfig, date: Date, offset: UtcOffset) -> Self {
        Self::new(
            date.with_time(config.start_time).assume_offset(offset),
            config.half_duration,
            config.break_duration,
            config.halves.len().try_into().unwrap_or(u8::MAX),
        )
    }

    pub fn total_duration(&self) -> Duration {
        let halves = u32::from(self.half_count);
        self.half_duration * halves + self.break_duration * halves.saturating_sub(1)
    }

    pub fn state_at(&self, now: OffsetDateTime) -> ClockState {
        if now < self.start {
            return ClockState {
                phase: MatchPhase::NotStarted,
                elapsed: Duration::ZERO,
                progress: 0.0,
            };
        }

        let elapsed: Duration = (now - self.start).try_into().unwrap_or(Duration::ZERO);
        let total = self.total_duration();
        if elapsed >= total {
            return ClockState {
                phase: MatchPhase::FullTime,
                elapsed,
                progress: 1.0,
            };
        }

        let cycle = self.half_duration + self.break_duration;
        let mut phase = MatchPhase::Break;
        for i in 0..self.half_count {
            let half_start = cycle * u32::from(i);
            if elapsed < half_start + self.half_duration {
                phase = MatchPhase::Half(i + 1);
                break;
            }
            if elapsed < half_start + cycle {
                break;
            }
        }

        let raw = elapsed.as_secs_f32() / total.as_secs_f32();
        ClockState {
            phase,
            elapsed,
            progress: (raw.clamp(0.0, 1.0) * 100.0).round() / 100.0,
        }
    }
}
