//! Alignment of arbitrary-resolution series onto the horizon periods.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::period::{hours, Period, Periods};
use crate::domain::series::TimeSeries;

/// How the values of a series relate to time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SeriesKind {
    /// Instantaneous power in kW, held until the next point.
    Power,
    /// Price per kWh, held until the next point.
    Price,
    /// Accumulated energy in kWh (meter style); resampled to mean kW.
    Energy,
}

#[derive(Debug, Error, PartialEq)]
pub enum ResampleError {
    #[error("series is empty")]
    Empty,
    #[error("no value at or before {0}")]
    NoValueBefore(DateTime<Utc>),
    #[error("series ends at {last}, before {needed}")]
    EndsTooEarly {
        last: DateTime<Utc>,
        needed: DateTime<Utc>,
    },
}

/// Resamples `series` onto `periods`, one value per period.
pub fn resample(
    series: &TimeSeries,
    kind: SeriesKind,
    periods: &Periods,
) -> Result<Vec<f64>, ResampleError> {
    let read_from = periods.start().unwrap_or_else(Utc::now);
    resample_from(series, kind, periods, read_from)
}

/// Like [`resample`], but a period that starts before `read_from` may open
/// with the first point at or before `read_from` when the series has nothing
/// earlier. Used when the horizon start was floored below the read instant.
pub fn resample_from(
    series: &TimeSeries,
    kind: SeriesKind,
    periods: &Periods,
    read_from: DateTime<Utc>,
) -> Result<Vec<f64>, ResampleError> {
    if series.is_empty() {
        return Err(ResampleError::Empty);
    }
    periods
        .iter()
        .map(|period| match kind {
            SeriesKind::Power | SeriesKind::Price => held_value(series, period, read_from),
            SeriesKind::Energy => energy_rate(series, period, read_from),
        })
        .collect()
}

/// First point of `series` when it lies inside `(period.start, read_from]`.
fn backfill_point(
    series: &TimeSeries,
    period: &Period,
    read_from: DateTime<Utc>,
) -> Option<(DateTime<Utc>, f64)> {
    series
        .at_or_after(period.start)
        .filter(|(t, _)| *t <= read_from && *t < period.end)
}

/// Step/hold value of a period, averaged by duration when the series has
/// points strictly inside the period.
fn held_value(
    series: &TimeSeries,
    period: &Period,
    read_from: DateTime<Utc>,
) -> Result<f64, ResampleError> {
    let (_, opening) = series
        .at_or_before(period.start)
        .or_else(|| backfill_point(series, period, read_from))
        .ok_or(ResampleError::NoValueBefore(period.start))?;

    let inner: Vec<_> = series.strictly_between(period.start, period.end).collect();
    if inner.is_empty() {
        return Ok(opening);
    }

    let total = period.hours();
    let weighted: f64 = std::iter::once((period.start, opening))
        .chain(inner)
        .chain(std::iter::once((period.end, f64::NAN)))
        .tuple_windows()
        .map(|((from, value), (to, _))| value * hours(to - from))
        .sum();
    Ok(weighted / total)
}

/// Mean power over a period from an accumulated-energy series.
fn energy_rate(
    series: &TimeSeries,
    period: &Period,
    read_from: DateTime<Utc>,
) -> Result<f64, ResampleError> {
    let from = match series.at_or_before(period.start) {
        Some(_) => period.start,
        None => backfill_point(series, period, read_from)
            .map(|(t, _)| t)
            .ok_or(ResampleError::NoValueBefore(period.start))?,
    };
    let start = cumulative_at(series, from)?;
    let end = cumulative_at(series, period.end)?;
    Ok((end - start) / hours(period.end - from))
}

/// Linearly interpolated cumulative value at `t`.
fn cumulative_at(series: &TimeSeries, t: DateTime<Utc>) -> Result<f64, ResampleError> {
    let (before_t, before_v) = series
        .at_or_before(t)
        .ok_or(ResampleError::NoValueBefore(t))?;
    if before_t == t {
        return Ok(before_v);
    }
    let (after_t, after_v) = series.at_or_after(t).ok_or_else(|| ResampleError::EndsTooEarly {
        last: before_t,
        needed: t,
    })?;
    let slope = (after_v - before_v) / hours(after_t - before_t);
    Ok(before_v + slope * hours(t - before_t))
}
