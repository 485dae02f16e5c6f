//! # Measurement Record
//!
//! The canonical, technology-independent form of one observation and its
//! wire mapping.

use chrono::{DateTime, SecondsFormat, Utc};

use super::reading::Position;
use crate::wire::{Scalar, Value};

/// Coordinate substituted when no location fix is available (Mumbai)
///
/// Records carrying it have `position_known == false`.
pub const DEFAULT_POSITION: Position = Position {
    lat: 19.0760,
    lon: 72.8777,
};

/// Radio access technology of the serving cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Technology {
    Unknown,
    Lte,
    Nr,
}

impl Technology {
    pub fn as_str(&self) -> &'static str {
        match self {
            Technology::Unknown => "Unknown",
            Technology::Lte => "LTE",
            Technology::Nr => "NR",
        }
    }
}

/// Frequency channel number, one per technology
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    Earfcn(String),
    Nrarfcn(String),
}

/// Operator and cell-topology identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkIds {
    pub mcc: Option<String>,
    pub mnc: Option<String>,
    pub tac: Option<String>,
    pub cell_id: Option<String>,
    pub physical_cell_id: Option<String>,
    pub channel: Option<Channel>,
}

impl NetworkIds {
    pub fn earfcn(&self) -> Option<&str> {
        match &self.channel {
            Some(Channel::Earfcn(c)) => Some(c),
            _ => None,
        }
    }

    pub fn nrarfcn(&self) -> Option<&str> {
        match &self.channel {
            Some(Channel::Nrarfcn(c)) => Some(c),
            _ => None,
        }
    }
}

/// Signal quality in dBm / dB (negative-signed where applicable)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalMetrics {
    pub rsrp: Option<f64>,
    pub rsrq: Option<f64>,
    /// NR only
    pub sinr: Option<f64>,
    /// Reserved, no collection path
    pub rssi: Option<f64>,
    /// Reserved, no collection path
    pub bandwidth: Option<f64>,
}

/// One normalized observation
///
/// Downstream stages only read records; they are never edited after the
/// normalizer builds them.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    pub timestamp: DateTime<Utc>,
    pub device_pseudonym: String,
    pub technology: Technology,
    pub network_ids: NetworkIds,
    pub signal: SignalMetrics,
    pub position: Position,
    /// False when `position` is [`DEFAULT_POSITION`] standing in for a missing fix
    pub position_known: bool,
    pub extra: Vec<(String, Scalar)>,
}

impl MeasurementRecord {
    /// Capture time as RFC3339 UTC with millisecond precision
    pub fn timestamp_rfc3339(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Wire mapping in the key order the collector expects
    pub fn to_value(&self) -> Value {
        let ids = &self.network_ids;
        let fields: Vec<(&str, Value)> = vec![
            ("ts", Value::String(self.timestamp_rfc3339())),
            ("device_hash", Value::from(self.device_pseudonym.as_str())),
            ("tech", Value::from(self.technology.as_str())),
            ("mcc", Value::from(ids.mcc.clone())),
            ("mnc", Value::from(ids.mnc.clone())),
            ("tac", Value::from(ids.tac.clone())),
            ("eci", Value::from(ids.cell_id.clone())),
            ("pci", Value::from(ids.physical_cell_id.clone())),
            ("earfcn", Value::from(ids.earfcn())),
            ("nrarfcn", Value::from(ids.nrarfcn())),
            ("rsrp", Value::from(self.signal.rsrp)),
            ("rsrq", Value::from(self.signal.rsrq)),
            ("sinr", Value::from(self.signal.sinr)),
            ("rssi", Value::from(self.signal.rssi)),
            ("bandwidth", Value::from(self.signal.bandwidth)),
            ("lat", Value::Float(self.position.lat)),
            ("lon", Value::Float(self.position.lon)),
            ("position_known", Value::Bool(self.position_known)),
            (
                "extra",
                Value::Map(
                    self.extra
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::from(v.clone())))
                        .collect(),
                ),
            ),
        ];
        Value::Map(fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{decode, encode};
    use chrono::TimeZone;

    fn sample_record() -> MeasurementRecord {
        MeasurementRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap(),
            device_pseudonym: "ab12".to_string(),
            technology: Technology::Nr,
            network_ids: NetworkIds {
                mcc: Some("404".to_string()),
                mnc: Some("45".to_string()),
                tac: Some("12345".to_string()),
                cell_id: Some("68719476735".to_string()),
                physical_cell_id: Some("321".to_string()),
                channel: Some(Channel::Nrarfcn("632628".to_string())),
            },
            signal: SignalMetrics {
                rsrp: Some(-80.0),
                rsrq: Some(-10.0),
                sinr: Some(12.0),
                rssi: None,
                bandwidth: None,
            },
            position: Position { lat: 28.6139, lon: 77.209 },
            position_known: true,
            extra: vec![
                ("model".to_string(), Scalar::from("Pixel \"8\"")),
                ("sdk".to_string(), Scalar::Integer(34)),
            ],
        }
    }

    #[test]
    fn test_wire_key_order() {
        let value = sample_record().to_value();
        assert_eq!(
            value.keys(),
            vec![
                "ts", "device_hash", "tech", "mcc", "mnc", "tac", "eci", "pci", "earfcn",
                "nrarfcn", "rsrp", "rsrq", "sinr", "rssi", "bandwidth", "lat", "lon",
                "position_known", "extra",
            ]
        );
    }

    #[test]
    fn test_wire_values() {
        let value = sample_record().to_value();
        assert_eq!(value.get("ts").and_then(Value::as_str), Some("2024-03-01T12:30:05.000Z"));
        assert_eq!(value.get("tech").and_then(Value::as_str), Some("NR"));
        assert_eq!(value.get("earfcn"), Some(&Value::Null));
        assert_eq!(value.get("nrarfcn").and_then(Value::as_str), Some("632628"));
        assert_eq!(value.get("rssi"), Some(&Value::Null));
        assert_eq!(value.get("position_known"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_round_trip_through_wire() {
        let value = sample_record().to_value();
        let decoded = decode(encode(&value).as_bytes()).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(
            decoded.get("extra").map(Value::keys),
            Some(vec!["model", "sdk"])
        );
    }

    #[test]
    fn test_channel_accessors_are_exclusive() {
        let ids = NetworkIds {
            channel: Some(Channel::Earfcn("1850".to_string())),
            ..Default::default()
        };
        assert_eq!(ids.earfcn(), Some("1850"));
        assert_eq!(ids.nrarfcn(), None);
        assert_eq!(NetworkIds::default().earfcn(), None);
    }

    #[test]
    fn test_technology_names() {
        assert_eq!(Technology::Unknown.as_str(), "Unknown");
        assert_eq!(Technology::Lte.as_str(), "LTE");
        assert_eq!(Technology::Nr.as_str(), "NR");
    }
}
