//! # Simulator Module
//!
//! Synthetic captures for exercising a collector without a handset.
//!
//! Every third capture is NR, the rest LTE. Positions are jittered within a
//! few kilometres of [`DEFAULT_POSITION`] and signal levels are drawn
//! uniformly from realistic ranges. Captures go through the normal
//! [`DeliveryEngine::submit`] path, so failed sends land in the queue and are
//! drained exactly as real ones would be.

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::delivery::{DeliveryEngine, SubmitOutcome};
use crate::error::Result;
use crate::measurement::{
    Capture, CellReading, DeviceInfo, LteCell, NrCell, Position, RadioSnapshot, DEFAULT_POSITION,
};
use crate::transport::Transport;

/// Square side of the jitter area around the centre
pub const SPREAD_KM: f64 = 5.0;

const KM_PER_DEGREE: f64 = 110.0;

/// Simulated SIM: MCC 404, MNC 45
const OPERATOR_CODE: &str = "40445";

const TAC: u32 = 12345;
const CELL_ID: u64 = 0xABCD;
const PCI: u32 = 321;
const EARFCN: u32 = 1800;
const NRARFCN: u32 = 632_628;

const LTE_RSRP_DBM: RangeInclusive<i32> = -120..=-70;
const LTE_RSRQ_DB: RangeInclusive<i32> = -20..=-3;
// NR levels are reported as magnitudes, kept below the "unavailable" sentinels
const NR_RSRP_MAGNITUDE: RangeInclusive<i32> = 70..=120;
const NR_RSRQ_MAGNITUDE: RangeInclusive<i32> = 3..=19;
const NR_SINR_DB: RangeInclusive<i32> = -5..=30;

/// Totals of one simulation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulationReport {
    pub delivered: usize,
    pub queued: usize,
}

/// Generator of synthetic captures
pub struct Simulator<R> {
    rng: R,
    center: Position,
    device: DeviceInfo,
}

impl Simulator<StdRng> {
    /// Reproducible sequence for a given seed
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<R: Rng> Simulator<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            center: DEFAULT_POSITION,
            device: DeviceInfo {
                manufacturer: "cellprobe".to_string(),
                model: "simulator".to_string(),
                platform_version: None,
            },
        }
    }

    /// Device the synthetic captures are attributed to
    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// Capture number `index` of a run
    pub fn capture(&mut self, index: usize) -> Capture {
        let cell = if index % 3 == 0 {
            CellReading::Nr(NrCell {
                registered: true,
                ss_rsrp: Some(self.rng.gen_range(NR_RSRP_MAGNITUDE)),
                ss_rsrq: Some(self.rng.gen_range(NR_RSRQ_MAGNITUDE)),
                ss_sinr: Some(self.rng.gen_range(NR_SINR_DB)),
                pci: Some(PCI),
                nrarfcn: Some(NRARFCN),
                tac: Some(TAC),
                nci: Some(CELL_ID),
            })
        } else {
            CellReading::Lte(LteCell {
                registered: true,
                rsrp: Some(self.rng.gen_range(LTE_RSRP_DBM)),
                rsrq: Some(self.rng.gen_range(LTE_RSRQ_DB)),
                pci: Some(PCI),
                earfcn: Some(EARFCN),
                tac: Some(TAC),
                ci: Some(CELL_ID),
            })
        };

        Capture {
            radio: RadioSnapshot {
                operator_code: Some(OPERATOR_CODE.to_string()),
                cells: vec![cell],
            },
            position: Some(self.jittered_position()),
            device: self.device.clone(),
        }
    }

    fn jittered_position(&mut self) -> Position {
        let spread = SPREAD_KM / KM_PER_DEGREE;
        Position {
            lat: self.center.lat + (self.rng.gen::<f64>() - 0.5) * spread,
            lon: self.center.lon + (self.rng.gen::<f64>() - 0.5) * spread,
        }
    }
}

/// Submit `count` synthetic captures, `interval` apart
///
/// # Errors
///
/// Stops at the first capture that could be neither sent nor queued and
/// returns its error.
pub async fn run<T, R>(
    engine: &DeliveryEngine<T>,
    simulator: &mut Simulator<R>,
    count: usize,
    interval: Duration,
) -> Result<SimulationReport>
where
    T: Transport,
    R: Rng,
{
    let mut report = SimulationReport::default();

    for index in 0..count {
        if index > 0 && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }

        let capture = simulator.capture(index);
        match engine
            .submit(&capture.radio, capture.position, &capture.device)
            .await
        {
            SubmitOutcome::Delivered => report.delivered += 1,
            SubmitOutcome::QueuedForRetry { entry, .. } => {
                debug!("Simulated capture {} queued as {}", index, entry);
                report.queued += 1;
            }
            SubmitOutcome::HardFailure(e) => return Err(e),
        }
    }

    info!(
        "Simulation finished: {} delivered, {} queued",
        report.delivered, report.queued
    );
    Ok(report)
}
