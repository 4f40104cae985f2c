use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NetworkError;

/// Converts a chrono duration into fractional hours.
pub fn hours(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 3_600_000.0
}

/// One tier of the horizon: `count` consecutive periods of `duration` each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierSpec {
    count: u32,
    duration: Duration,
}

impl TierSpec {
    /// Rejects non-positive counts and durations.
    pub fn new(count: u32, duration: Duration) -> Result<Self, NetworkError> {
        if count == 0 {
            return Err(NetworkError::configuration("tier period count must be positive"));
        }
        if duration <= Duration::zero() {
            return Err(NetworkError::configuration(format!(
                "tier period duration must be positive, got {duration}"
            )));
        }
        Ok(Self { count, duration })
    }

    pub fn minutes(count: u32, minutes: i64) -> Result<Self, NetworkError> {
        Self::new(count, Duration::minutes(minutes))
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn total(&self) -> Duration {
        self.duration * self.count as i32
    }
}

/// Validated, ordered list of tiers.
///
/// Tiers must be declared from finest to coarsest so that period durations
/// never decrease along the horizon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HorizonSpec {
    tiers: Vec<TierSpec>,
}

impl HorizonSpec {
    pub fn new(tiers: Vec<TierSpec>) -> Result<Self, NetworkError> {
        if tiers.is_empty() {
            return Err(NetworkError::configuration("at least one tier is required"));
        }
        for (i, pair) in tiers.windows(2).enumerate() {
            if pair[1].duration < pair[0].duration {
                return Err(NetworkError::configuration(format!(
                    "tier {} has shorter periods ({}) than tier {} ({})",
                    i + 2,
                    pair[1].duration,
                    i + 1,
                    pair[0].duration
                )));
            }
        }
        Ok(Self { tiers })
    }

    pub fn tiers(&self) -> &[TierSpec] {
        &self.tiers
    }

    /// Sum of all declared tier durations.
    pub fn total_duration(&self) -> Duration {
        self.tiers
            .iter()
            .fold(Duration::zero(), |acc, tier| acc + tier.total())
    }

    pub fn period_count(&self) -> usize {
        self.tiers.iter().map(|t| t.count as usize).sum()
    }

    /// Floors `now` onto the grid of the first tier so that consecutive cycles
    /// share period boundaries. Falls back to `now` if the duration cannot be
    /// used for rounding.
    pub fn aligned_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let step = self.tiers[0].duration;
        now.duration_trunc(step).unwrap_or(now)
    }

    /// Emits the period sequence starting at `start`.
    pub fn build(&self, start: DateTime<Utc>) -> Periods {
        let mut periods = Vec::with_capacity(self.period_count());
        let mut cursor = start;
        for tier in &self.tiers {
            for _ in 0..tier.count {
                let end = cursor + tier.duration;
                periods.push(Period { start: cursor, end });
                cursor = end;
            }
        }
        Periods { periods }
    }
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn hours(&self) -> f64 {
        hours(self.duration())
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }
}

/// Contiguous, ordered, non-overlapping period sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Periods {
    periods: Vec<Period>,
}

impl Periods {
    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Period> {
        self.periods.iter()
    }

    pub fn as_slice(&self) -> &[Period] {
        &self.periods
    }

    pub fn get(&self, index: usize) -> Option<&Period> {
        self.periods.get(index)
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.periods.first().map(|p| p.start)
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.periods.last().map(|p| p.end)
    }

    pub fn total_duration(&self) -> Duration {
        match (self.start(), self.end()) {
            (Some(start), Some(end)) => end - start,
            _ => Duration::zero(),
        }
    }

    /// Period lengths in hours, in order.
    pub fn hours(&self) -> Vec<f64> {
        self.periods.iter().map(Period::hours).collect()
    }

    /// The n+1 instants bounding the periods.
    pub fn boundaries(&self) -> Vec<DateTime<Utc>> {
        let mut out: Vec<_> = self.periods.iter().map(|p| p.start).collect();
        out.extend(self.end());
        out
    }

    /// Hours between the start of the horizon and the start of period `index`.
    pub fn offset_hours(&self, index: usize) -> f64 {
        match (self.start(), self.periods.get(index)) {
            (Some(origin), Some(period)) => hours(period.start - origin),
            _ => 0.0,
        }
    }
}

impl<'a> IntoIterator for &'a Periods {
    type Item = &'a Period;
    type IntoIter = std::slice::Iter<'a, Period>;

    fn into_iter(self) -> Self::IntoIter {
        self.periods.iter()
    }
}
