use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single `{timestamp, value}` pair as exchanged with the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Mapping from absolute timestamp to value with strictly increasing keys.
///
/// Serialized as an ordered list of [`ForecastPoint`]s. Duplicate timestamps in
/// the input keep the last value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<ForecastPoint>", into = "Vec<ForecastPoint>")]
pub struct TimeSeries {
    points: BTreeMap<DateTime<Utc>, f64>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (DateTime<Utc>, f64)>) -> Self {
        Self {
            points: pairs.into_iter().collect(),
        }
    }

    /// Builds a series by zipping timestamps with values.
    pub fn zip(
        timestamps: impl IntoIterator<Item = DateTime<Utc>>,
        values: impl IntoIterator<Item = f64>,
    ) -> Self {
        Self::from_pairs(timestamps.into_iter().zip(values))
    }

    pub fn insert(&mut self, timestamp: DateTime<Utc>, value: f64) {
        self.points.insert(timestamp, value);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.points.iter().map(|(t, v)| (*t, *v))
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.values().copied()
    }

    pub fn first(&self) -> Option<(DateTime<Utc>, f64)> {
        self.points.first_key_value().map(|(t, v)| (*t, *v))
    }

    pub fn last(&self) -> Option<(DateTime<Utc>, f64)> {
        self.points.last_key_value().map(|(t, v)| (*t, *v))
    }

    pub fn get(&self, timestamp: DateTime<Utc>) -> Option<f64> {
        self.points.get(&timestamp).copied()
    }

    /// Last point at or before `t`.
    pub fn at_or_before(&self, t: DateTime<Utc>) -> Option<(DateTime<Utc>, f64)> {
        self.points.range(..=t).next_back().map(|(t, v)| (*t, *v))
    }

    /// First point at or after `t`.
    pub fn at_or_after(&self, t: DateTime<Utc>) -> Option<(DateTime<Utc>, f64)> {
        self.points.range(t..).next().map(|(t, v)| (*t, *v))
    }

    /// Points with `from < timestamp < to`.
    pub fn strictly_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        use std::ops::Bound::Excluded;
        self.points
            .range((Excluded(from), Excluded(to)))
            .map(|(t, v)| (*t, *v))
    }

    /// Drops every point inside the inclusive range `[from, to]`.
    pub fn remove_range(&mut self, from: DateTime<Utc>, to: DateTime<Utc>) {
        self.points.retain(|t, _| *t < from || *t > to);
    }

    /// Overlays `other` on top of `self`: inside `other`'s own time span only
    /// `other`'s points survive.
    pub fn overlay(&mut self, other: &TimeSeries) {
        if let (Some((from, _)), Some((to, _))) = (other.first(), other.last()) {
            self.remove_range(from, to);
            self.points.extend(other.points.iter().map(|(t, v)| (*t, *v)));
        }
    }
}

impl From<Vec<ForecastPoint>> for TimeSeries {
    fn from(points: Vec<ForecastPoint>) -> Self {
        Self::from_pairs(points.into_iter().map(|p| (p.timestamp, p.value)))
    }
}

impl From<TimeSeries> for Vec<ForecastPoint> {
    fn from(series: TimeSeries) -> Self {
        series
            .points
            .into_iter()
            .map(|(timestamp, value)| ForecastPoint { timestamp, value })
            .collect()
    }
}

impl FromIterator<(DateTime<Utc>, f64)> for TimeSeries {
    fn from_iter<I: IntoIterator<Item = (DateTime<Utc>, f64)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}
