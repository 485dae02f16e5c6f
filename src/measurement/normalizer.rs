//! # Measurement Normalizer
//!
//! Turns a raw radio snapshot into a [`MeasurementRecord`].
//!
//! ## Serving cell
//!
//! The first registered cell in reported order wins. If there is none, or it
//! is neither LTE nor NR, the record is `Unknown` with every signal and cell
//! field null.
//!
//! ## NR sentinels
//!
//! Some modems report NR SS-RSRP / SS-RSRQ as unsigned magnitudes and use a
//! large value for "unavailable":
//!
//! | raw SS-RSRP | result   |
//! |-------------|----------|
//! | `80`        | `-80.0`  |
//! | `>= 140`    | `null`   |
//!
//! SS-RSRQ uses the same rule with a threshold of `20`. SS-SINR is already
//! signed and copied as-is.
//!
//! ## Usage
//!
//! ```
//! use cellprobe::identity::IdentityHasher;
//! use cellprobe::measurement::normalizer::Normalizer;
//! use cellprobe::measurement::reading::{CellReading, DeviceInfo, LteCell, RadioSnapshot};
//! use cellprobe::measurement::record::{Technology, DEFAULT_POSITION};
//!
//! let snapshot = RadioSnapshot {
//!     operator_code: Some("405045".to_string()),
//!     cells: vec![CellReading::Lte(LteCell {
//!         registered: true,
//!         rsrp: Some(-95),
//!         rsrq: Some(-11),
//!         ..Default::default()
//!     })],
//! };
//! let normalizer = Normalizer::new(IdentityHasher::default());
//! let record = normalizer.normalize(&snapshot, None, &DeviceInfo::default());
//!
//! assert_eq!(record.technology, Technology::Lte);
//! assert_eq!(record.network_ids.mcc.as_deref(), Some("405"));
//! assert_eq!(record.signal.rsrp, Some(-95.0));
//! assert_eq!(record.position, DEFAULT_POSITION);
//! ```

use chrono::{DateTime, Utc};

use super::reading::{
    DeviceInfo, LteCell, NrCell, Position, RadioSnapshot, ServingCell, NR_RSRP_UNAVAILABLE,
    NR_RSRQ_UNAVAILABLE,
};
use super::record::{
    Channel, MeasurementRecord, NetworkIds, SignalMetrics, Technology, DEFAULT_POSITION,
};
use crate::identity::IdentityHasher;
use crate::wire::Scalar;

/// Builds records from raw snapshots
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    hasher: IdentityHasher,
}

impl Normalizer {
    #[must_use]
    pub fn new(hasher: IdentityHasher) -> Self {
        Self { hasher }
    }

    /// Normalize a snapshot captured now
    pub fn normalize(
        &self,
        snapshot: &RadioSnapshot,
        position: Option<Position>,
        device: &DeviceInfo,
    ) -> MeasurementRecord {
        self.normalize_at(snapshot, position, device, Utc::now())
    }

    /// Normalize a snapshot captured at `captured_at`
    ///
    /// Never fails: missing or sentinel fields become nulls.
    pub fn normalize_at(
        &self,
        snapshot: &RadioSnapshot,
        position: Option<Position>,
        device: &DeviceInfo,
        captured_at: DateTime<Utc>,
    ) -> MeasurementRecord {
        let (mcc, mnc) = split_operator_code(snapshot.operator_code.as_deref());

        let (technology, cell_ids, signal) = match snapshot.serving_cell() {
            ServingCell::Lte(cell) => (Technology::Lte, lte_ids(cell), lte_signal(cell)),
            ServingCell::Nr(cell) => (Technology::Nr, nr_ids(cell), nr_signal(cell)),
            ServingCell::Unregistered => {
                (Technology::Unknown, NetworkIds::default(), SignalMetrics::default())
            }
        };

        let mut extra = vec![("model".to_string(), Scalar::from(device.model.trim()))];
        extra.push((
            "sdk".to_string(),
            device.platform_version.map_or(Scalar::Null, Scalar::Integer),
        ));

        MeasurementRecord {
            timestamp: captured_at,
            device_pseudonym: self.hasher.pseudonym(&device.identity()),
            technology,
            network_ids: NetworkIds { mcc, mnc, ..cell_ids },
            signal,
            position: position.unwrap_or(DEFAULT_POSITION),
            position_known: position.is_some(),
            extra,
        }
    }
}

/// Split "MCCMNC" into its parts
///
/// The first three characters are the MCC; anything after is the MNC.
pub fn split_operator_code(code: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(code) = code.map(str::trim) else {
        return (None, None);
    };
    match (code.get(..3), code.get(3..)) {
        (Some(mcc), Some(mnc)) if !mnc.is_empty() => (Some(mcc.to_string()), Some(mnc.to_string())),
        (Some(mcc), _) => (Some(mcc.to_string()), None),
        _ => (None, None),
    }
}

fn to_text<T: ToString>(v: Option<T>) -> Option<String> {
    v.map(|v| v.to_string())
}

fn lte_ids(cell: &LteCell) -> NetworkIds {
    NetworkIds {
        tac: to_text(cell.tac),
        cell_id: to_text(cell.ci),
        physical_cell_id: to_text(cell.pci),
        channel: cell.earfcn.map(|c| Channel::Earfcn(c.to_string())),
        ..Default::default()
    }
}

fn lte_signal(cell: &LteCell) -> SignalMetrics {
    SignalMetrics {
        rsrp: cell.rsrp.map(f64::from),
        rsrq: cell.rsrq.map(f64::from),
        ..Default::default()
    }
}

fn nr_ids(cell: &NrCell) -> NetworkIds {
    NetworkIds {
        tac: to_text(cell.tac),
        cell_id: to_text(cell.nci),
        physical_cell_id: to_text(cell.pci),
        channel: cell.nrarfcn.map(|c| Channel::Nrarfcn(c.to_string())),
        ..Default::default()
    }
}

fn nr_signal(cell: &NrCell) -> SignalMetrics {
    SignalMetrics {
        rsrp: negate_below(cell.ss_rsrp, NR_RSRP_UNAVAILABLE),
        rsrq: negate_below(cell.ss_rsrq, NR_RSRQ_UNAVAILABLE),
        sinr: cell.ss_sinr.map(f64::from),
        ..Default::default()
    }
}

/// Negate a raw magnitude, or drop it at/above the sentinel
fn negate_below(raw: Option<i32>, sentinel: i32) -> Option<f64> {
    raw.filter(|&v| v < sentinel).map(|v| -f64::from(v))
}
