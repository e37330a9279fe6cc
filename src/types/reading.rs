//! Telemetry channel schema and the Reading type

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Number of telemetry channels carried by every [`Reading`].
pub const CHANNEL_COUNT: usize = 7;

/// Tableting line telemetry channels, in schema order.
///
/// The order is fixed: it is the column order the forecaster and the
/// fitted scalers were trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Rejected tablets in the sampling interval
    #[serde(rename = "waste")]
    Waste,
    /// Accepted tablets in the sampling interval
    #[serde(rename = "produced")]
    Produced,
    /// Ejection force
    #[serde(rename = "ejection")]
    Ejection,
    /// Turret (table) speed
    #[serde(rename = "tbl_speed")]
    TblSpeed,
    /// Punch stiffness
    #[serde(rename = "stiffness")]
    Stiffness,
    /// Relative standard deviation of the compression signal
    #[serde(rename = "SREL")]
    Srel,
    /// Main compression force
    #[serde(rename = "main_comp")]
    MainComp,
}

impl Channel {
    /// All channels in schema order.
    pub const ALL: [Self; CHANNEL_COUNT] = [
        Self::Waste,
        Self::Produced,
        Self::Ejection,
        Self::TblSpeed,
        Self::Stiffness,
        Self::Srel,
        Self::MainComp,
    ];

    /// Position of this channel inside a [`Reading`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Wire name used by the telemetry source.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Waste => "waste",
            Self::Produced => "produced",
            Self::Ejection => "ejection",
            Self::TblSpeed => "tbl_speed",
            Self::Stiffness => "stiffness",
            Self::Srel => "SREL",
            Self::MainComp => "main_comp",
        }
    }

    /// Fallback value (training-data median) used when a channel is missing.
    pub const fn default_value(self) -> f64 {
        match self {
            Self::Waste | Self::Produced => 0.0,
            Self::Ejection => 120.0,
            Self::TblSpeed | Self::Stiffness => 100.0,
            Self::Srel => 3.5,
            Self::MainComp => 15.0,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Schema default for every channel, in schema order.
pub fn default_values() -> [f64; CHANNEL_COUNT] {
    Channel::ALL.map(Channel::default_value)
}

/// One time-associated vector of channel values.
///
/// Values are stored in [`Channel::ALL`] order. A value may be non-finite
/// only transiently (e.g. a sensor reporting NaN); the preprocessing gap
/// fill resolves those before anything is derived from the reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Source timestamp, or receipt time when the source did not send one
    pub timestamp: Option<DateTime<Utc>>,
    pub values: [f64; CHANNEL_COUNT],
}

impl Reading {
    pub const fn new(values: [f64; CHANNEL_COUNT]) -> Self {
        Self {
            timestamp: None,
            values,
        }
    }

    /// Reading made entirely of schema defaults.
    pub fn defaults() -> Self {
        Self::new(default_values())
    }

    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Build a reading from a JSON record keyed by channel name.
    ///
    /// Absent, `null` or non-numeric channels resolve to the schema default.
    /// A `timestamp` field, when present and parseable, is carried over.
    pub fn from_record(record: &serde_json::Map<String, serde_json::Value>) -> Self {
        let values = Channel::ALL.map(|channel| {
            record
                .get(channel.name())
                .and_then(json_number)
                .unwrap_or_else(|| channel.default_value())
        });

        let timestamp = record
            .get("timestamp")
            .and_then(serde_json::Value::as_str)
            .and_then(parse_timestamp);

        Self { timestamp, values }
    }

    pub const fn get(&self, channel: Channel) -> f64 {
        self.values[channel.index()]
    }

    pub fn set(&mut self, channel: Channel, value: f64) {
        self.values[channel.index()] = value;
    }

    /// True when every channel holds a finite value.
    pub fn is_complete(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Element-wise mean of a window; `None` for an empty window.
    pub fn mean_of(window: &[Self]) -> Option<Self> {
        if window.is_empty() {
            return None;
        }
        let n = window.len() as f64;
        let mut sums = [0.0_f64; CHANNEL_COUNT];
        for reading in window {
            for (sum, value) in sums.iter_mut().zip(reading.values.iter()) {
                *sum += value;
            }
        }
        Some(Self {
            timestamp: window.last().and_then(|r| r.timestamp),
            values: sums.map(|s| s / n),
        })
    }
}

/// RFC 3339, or an ISO 8601 local time without offset (read as UTC), which
/// is what the sensor API emits for its dataset timestamps.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn json_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl Serialize for Reading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = usize::from(self.timestamp.is_some());
        let mut map = serializer.serialize_map(Some(CHANNEL_COUNT + extra))?;
        if let Some(ts) = &self.timestamp {
            map.serialize_entry("timestamp", &ts.to_rfc3339())?;
        }
        for channel in Channel::ALL {
            map.serialize_entry(channel.name(), &self.get(channel))?;
        }
        map.end()
    }
}
