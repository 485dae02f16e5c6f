//! # Raw Radio Readings
//!
//! Snapshots as reported by the platform telephony layer, before any
//! normalization. Every field is optional because vendors leave them out
//! freely.

use serde::Deserialize;

/// One LTE cell as reported upstream
///
/// RSRP/RSRQ already carry the standard negative sign.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LteCell {
    #[serde(default)]
    pub registered: bool,
    pub rsrp: Option<i32>,
    pub rsrq: Option<i32>,
    pub pci: Option<u32>,
    pub earfcn: Option<u32>,
    pub tac: Option<u32>,
    /// E-UTRAN cell identity
    pub ci: Option<u64>,
}

/// One NR (5G) cell as reported upstream
///
/// `ss_rsrp` / `ss_rsrq` may arrive as unsigned magnitudes with an
/// "unavailable" sentinel; see [`NR_RSRP_UNAVAILABLE`] and [`NR_RSRQ_UNAVAILABLE`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NrCell {
    #[serde(default)]
    pub registered: bool,
    pub ss_rsrp: Option<i32>,
    pub ss_rsrq: Option<i32>,
    pub ss_sinr: Option<i32>,
    pub pci: Option<u32>,
    pub nrarfcn: Option<u32>,
    pub tac: Option<u32>,
    /// NR cell identity (36 bits)
    pub nci: Option<u64>,
}

/// Raw NR RSRP magnitudes at or above this mean "unavailable"
pub const NR_RSRP_UNAVAILABLE: i32 = 140;

/// Raw NR RSRQ magnitudes at or above this mean "unavailable"
pub const NR_RSRQ_UNAVAILABLE: i32 = 20;

/// A candidate cell, tagged by radio technology
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "technology", rename_all = "lowercase")]
pub enum CellReading {
    Lte(LteCell),
    Nr(NrCell),
    /// GSM, WCDMA, CDMA, ... (carried only so list order is honoured)
    Other {
        #[serde(default)]
        registered: bool,
    },
}

impl CellReading {
    pub fn is_registered(&self) -> bool {
        match self {
            CellReading::Lte(cell) => cell.registered,
            CellReading::Nr(cell) => cell.registered,
            CellReading::Other { registered } => *registered,
        }
    }
}

/// The cell a sample is attributed to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServingCell<'a> {
    Lte(&'a LteCell),
    Nr(&'a NrCell),
    /// No registered cell, or the registered one is neither LTE nor NR
    Unregistered,
}

/// Everything the telephony layer reported at one instant
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RadioSnapshot {
    /// SIM operator code, MCC followed by MNC (e.g. "405045")
    pub operator_code: Option<String>,
    /// Candidate cells in the order reported upstream
    #[serde(default)]
    pub cells: Vec<CellReading>,
}

impl RadioSnapshot {
    /// Select the first registered cell in reported order
    ///
    /// The search stops at the first registered cell even if its technology
    /// is unsupported.
    pub fn serving_cell(&self) -> ServingCell<'_> {
        match self.cells.iter().find(|c| c.is_registered()) {
            Some(CellReading::Lte(cell)) => ServingCell::Lte(cell),
            Some(CellReading::Nr(cell)) => ServingCell::Nr(cell),
            Some(CellReading::Other { .. }) | None => ServingCell::Unregistered,
        }
    }
}

/// A location fix
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
}

/// Device properties used for the pseudonym and `extra` metadata
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub model: String,
    /// Platform API level / OS version
    pub platform_version: Option<i64>,
}

impl DeviceInfo {
    /// Identity string fed to the hasher: `"<manufacturer>-<model>"`
    pub fn identity(&self) -> String {
        format!("{}-{}", self.manufacturer.trim(), self.model.trim())
    }
}

/// One capture as handed over by a reading provider
///
/// ```toml
/// [radio]
/// operator_code = "405045"
///
/// [[radio.cells]]
/// technology = "lte"
/// registered = true
/// rsrp = -95
///
/// [position]
/// lat = 19.1
/// lon = 72.9
///
/// [device]
/// manufacturer = "Google"
/// model = "Pixel 8"
/// platform_version = 34
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Capture {
    #[serde(default)]
    pub radio: RadioSnapshot,
    /// Absent when the platform had no location fix
    pub position: Option<Position>,
    #[serde(default)]
    pub device: DeviceInfo,
}
