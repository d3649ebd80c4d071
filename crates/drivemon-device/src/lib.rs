//! Drivemon device access - raw SMART I/O
//!
//! This crate talks to storage devices directly, without shelling out
//! to external tools:
//! - NVMe: admin passthrough ioctl (Identify, Get Log Page)
//! - SATA: drive-command ioctl (IDENTIFY DEVICE, SMART READ DATA)
//! - SCSI: SG_IO INQUIRY
//! - Discovery over `/sys/block` with protocol classification
//!
//! Every call that touches hardware can fail per-call; callers are
//! expected to log and skip, never abort.

pub mod ata;
pub mod discover;
pub mod nvme;
pub mod scsi;

// Re-exports
pub use ata::{AtaAttribute, AtaHandle, AtaIdentify};
pub use discover::{BlockDevice, Discovered, classify, discover};
pub use nvme::{IdentifyController, IdentifyNamespace, NvmeHandle, NvmeSmartLog, U128Le};
pub use scsi::{ScsiHandle, ScsiInquiry};
