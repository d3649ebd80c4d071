//! Drivemon exporter - device-to-metric translation
//!
//! The heart of the exporter:
//! - a typed metric model (descriptor, observation, kind)
//! - append-only descriptor registries, one per protocol scope
//! - per-protocol decoders turning raw SMART structures into
//!   labeled observations
//! - the two-phase describe/collect aggregator the scrape endpoint
//!   drives
//! - text exposition rendering

pub mod collector;
pub mod desc;
pub mod exposition;
pub mod nvme;
pub mod sata;
pub mod scsi;

// Re-exports
pub use collector::{Collector, ScrapeDevice};
pub use desc::{MetricDesc, MetricKind, Observation, Registry};
pub use exposition::render;
pub use nvme::NvmeDev;
pub use sata::{SataDev, metric_name, parse_spin_up_time, sata_version};
pub use scsi::ScsiDev;
