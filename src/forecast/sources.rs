//! Live sensor state and how element inputs reference it.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::period::Periods;
use crate::domain::series::TimeSeries;
use crate::forecast::resample::{resample_from, ResampleError, SeriesKind};

#[derive(Debug, Error, PartialEq)]
pub enum SourceError {
    #[error("sensor `{0}` has no reading")]
    Missing(String),
    #[error("sensor `{0}` reports no current value")]
    NoValue(String),
    #[error("sensor `{sensor}` is stale (last update {updated_at})")]
    Stale {
        sensor: String,
        updated_at: DateTime<Utc>,
    },
    #[error("sensor list is empty")]
    NoSensors,
    #[error("resampling failed: {0}")]
    Resample(#[from] ResampleError),
}

/// One reading as provided by the host's sensor layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub forecast: TimeSeries,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SensorReading {
    pub fn value(value: f64) -> Self {
        Self {
            value: Some(value),
            ..Default::default()
        }
    }

    pub fn forecast(forecast: TimeSeries) -> Self {
        Self {
            forecast,
            ..Default::default()
        }
    }

    pub fn updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }
}

/// Snapshot of every sensor the network may read, keyed by sensor name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LiveState {
    readings: HashMap<String, SensorReading>,
}

impl LiveState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sensor: impl Into<String>, reading: SensorReading) -> Self {
        self.insert(sensor, reading);
        self
    }

    pub fn insert(&mut self, sensor: impl Into<String>, reading: SensorReading) {
        self.readings.insert(sensor.into(), reading);
    }

    pub fn get(&self, sensor: &str) -> Option<&SensorReading> {
        self.readings.get(sensor)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Reading for `sensor`, rejected when older than `max_age` at `now`.
    pub fn fresh(
        &self,
        sensor: &str,
        now: DateTime<Utc>,
        max_age: Option<Duration>,
    ) -> Result<&SensorReading, SourceError> {
        let reading = self
            .get(sensor)
            .ok_or_else(|| SourceError::Missing(sensor.to_string()))?;
        if let (Some(max_age), Some(updated_at)) = (max_age, reading.updated_at) {
            if now - updated_at > max_age {
                return Err(SourceError::Stale {
                    sensor: sensor.to_string(),
                    updated_at,
                });
            }
        }
        Ok(reading)
    }
}

/// Where an element parameter comes from.
///
/// Deserializes from a bare number, a sensor name, or a list of sensor
/// names whose forecasts are merged in declared order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueSource {
    Constant(f64),
    Sensor(String),
    Sensors(Vec<String>),
}

impl ValueSource {
    fn sensors(&self) -> &[String] {
        match self {
            ValueSource::Constant(_) => &[],
            ValueSource::Sensor(name) => std::slice::from_ref(name),
            ValueSource::Sensors(names) => names,
        }
    }

    /// Current scalar value: the constant, or the first listed sensor that
    /// reports a value.
    pub fn current(
        &self,
        state: &LiveState,
        now: DateTime<Utc>,
        max_age: Option<Duration>,
    ) -> Result<f64, SourceError> {
        if let ValueSource::Constant(value) = self {
            return Ok(*value);
        }
        let mut last_err = SourceError::NoSensors;
        for sensor in self.sensors() {
            match state.fresh(sensor, now, max_age) {
                Ok(SensorReading { value: Some(v), .. }) => return Ok(*v),
                Ok(_) => last_err = SourceError::NoValue(sensor.clone()),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    /// Per-period values over `periods`.
    ///
    /// Sensors contribute their forecast when present, otherwise their current
    /// value held from `now`. Multiple sensors overlay each other by timestamp
    /// with the later one winning on overlap. Once any forecast is involved the
    /// merged series must reach the start of the last period.
    pub fn series(
        &self,
        state: &LiveState,
        kind: SeriesKind,
        periods: &Periods,
        now: DateTime<Utc>,
        max_age: Option<Duration>,
    ) -> Result<Vec<f64>, SourceError> {
        if let ValueSource::Constant(value) = self {
            return Ok(vec![*value; periods.len()]);
        }
        let sensors = self.sensors();
        if sensors.is_empty() {
            return Err(SourceError::NoSensors);
        }

        let mut merged = TimeSeries::new();
        let mut forecast = false;
        for sensor in sensors {
            let reading = state.fresh(sensor, now, max_age)?;
            if !reading.forecast.is_empty() {
                merged.overlay(&reading.forecast);
                forecast = true;
            } else if let Some(value) = reading.value {
                let since = periods.start().map_or(now, |start| start.min(now));
                merged.overlay(&TimeSeries::from_pairs([(since, value)]));
            } else {
                return Err(SourceError::NoValue(sensor.clone()));
            }
        }

        let values = resample_from(&merged, kind, periods, now)?;
        if forecast {
            if let (Some((last, _)), Some(needed)) =
                (merged.last(), periods.iter().last().map(|p| p.start))
            {
                if last < needed {
                    return Err(ResampleError::EndsTooEarly { last, needed }.into());
                }
            }
        }
        Ok(values)
    }
}

impl From<f64> for ValueSource {
    fn from(value: f64) -> Self {
        ValueSource::Constant(value)
    }
}

impl From<&str> for ValueSource {
    fn from(sensor: &str) -> Self {
        ValueSource::Sensor(sensor.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::period::{HorizonSpec, TierSpec};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 22, 0, 0).unwrap()
    }

    fn periods() -> Periods {
        HorizonSpec::new(vec![TierSpec::minutes(4, 60).unwrap()])
            .unwrap()
            .build(now())
    }

    fn hourly(offset: i64, values: &[f64]) -> TimeSeries {
        TimeSeries::zip(
            (0..values.len() as i64).map(|h| now() + Duration::hours(offset + h)),
            values.iter().copied(),
        )
    }

    #[test]
    fn test_constant_source() {
        let source = ValueSource::from(0.3);
        let values = source
            .series(&LiveState::new(), SeriesKind::Price, &periods(), now(), None)
            .unwrap();
        assert_eq!(values, vec![0.3; 4]);
    }

    #[test]
    fn test_later_sensor_wins_on_overlap() {
        let state = LiveState::new()
            .with("today", SensorReading::forecast(hourly(0, &[1.0, 1.0, 1.0])))
            .with("tomorrow", SensorReading::forecast(hourly(2, &[2.0, 2.0])));
        let source = ValueSource::Sensors(vec!["today".into(), "tomorrow".into()]);

        let values = source
            .series(&state, SeriesKind::Power, &periods(), now(), None)
            .unwrap();
        assert_eq!(values, vec![1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_value_only_sensor_is_held() {
        let state = LiveState::new().with("load", SensorReading::value(1.5));
        let values = ValueSource::from("load")
            .series(&state, SeriesKind::Power, &periods(), now(), None)
            .unwrap();
        assert_eq!(values, vec![1.5; 4]);
    }

    #[test]
    fn test_missing_sensor() {
        let err = ValueSource::from("nope")
            .current(&LiveState::new(), now(), None)
            .unwrap_err();
        assert_eq!(err, SourceError::Missing("nope".to_string()));
    }

    #[test]
    fn test_stale_reading_rejected() {
        let state = LiveState::new().with(
            "soc",
            SensorReading::value(40.0).updated_at(now() - Duration::minutes(90)),
        );
        let source = ValueSource::from("soc");
        assert!(matches!(
            source.current(&state, now(), Some(Duration::minutes(30))),
            Err(SourceError::Stale { .. })
        ));
        assert_eq!(source.current(&state, now(), None).unwrap(), 40.0);
    }

    #[test]
    fn test_forecast_starting_late_is_insufficient() {
        let state = LiveState::new().with("pv", SensorReading::forecast(hourly(1, &[3.0, 3.0])));
        let err = ValueSource::from("pv")
            .series(&state, SeriesKind::Power, &periods(), now(), None)
            .unwrap_err();
        assert!(matches!(err, SourceError::Resample(ResampleError::NoValueBefore(_))));
    }

    #[test]
    fn test_forecast_ending_early_is_insufficient() {
        let state = LiveState::new().with("pv", SensorReading::forecast(hourly(0, &[5.0, 5.0])));
        let err = ValueSource::from("pv")
            .series(&state, SeriesKind::Power, &periods(), now(), None)
            .unwrap_err();
        assert_eq!(
            err,
            SourceError::Resample(ResampleError::EndsTooEarly {
                last: now() + Duration::hours(1),
                needed: now() + Duration::hours(3),
            })
        );
    }

    #[test]
    fn test_forecast_reaching_last_period_start_is_enough() {
        let state = LiveState::new().with(
            "pv",
            SensorReading::forecast(hourly(0, &[1.0, 2.0, 3.0, 4.0])),
        );
        let values = ValueSource::from("pv")
            .series(&state, SeriesKind::Power, &periods(), now(), None)
            .unwrap();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_unaligned_horizon_reads_forecast_from_now() {
        let start = now() - Duration::minutes(20);
        let periods = HorizonSpec::new(vec![TierSpec::minutes(2, 60).unwrap()])
            .unwrap()
            .build(start);
        let state =
            LiveState::new().with("price", SensorReading::forecast(hourly(0, &[0.2, 0.4])));
        let values = ValueSource::from("price")
            .series(&state, SeriesKind::Price, &periods, now(), None)
            .unwrap();
        assert!((values[0] - 0.2).abs() < 1e-12);
        assert!((values[1] - (0.2 / 3.0 + 0.4 * 2.0 / 3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_deserialize_forms() {
        let parsed: Vec<ValueSource> =
            serde_json::from_str(r#"[0.25, "sensor.price", ["sensor.a", "sensor.b"]]"#).unwrap();
        assert_eq!(parsed[0], ValueSource::Constant(0.25));
        assert_eq!(parsed[1], ValueSource::Sensor("sensor.price".into()));
        assert_eq!(parsed[2], ValueSource::Sensors(vec!["sensor.a".into(), "sensor.b".into()]));
    }

    #[test]
    fn test_live_state_json() {
        let state: LiveState = serde_json::from_str(
            r#"{
                "sensor.soc": {"value": 55.0},
                "sensor.pv": {"forecast": [{"timestamp": "2025-05-01T22:00:00Z", "value": 0.0}]}
            }"#,
        )
        .unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(state.get("sensor.soc").unwrap().value, Some(55.0));
        assert_eq!(state.get("sensor.pv").unwrap().forecast.len(), 1);
    }
}
