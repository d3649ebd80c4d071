//! Block device discovery and protocol classification
//!
//! Scans `/sys/block` once at startup, skips virtual devices and any
//! user-supplied exclusions, and classifies what remains. A device that
//! cannot be opened or classified is logged and skipped; discovery
//! itself never fails.

use crate::ata::AtaHandle;
use crate::nvme::NvmeHandle;
use crate::scsi::ScsiHandle;
use drivemon_common::{Error, Result};
use std::fs;
use tracing::{debug, warn};

/// Device name prefixes with no SMART interface behind them
/// (loopbacks, compressed RAM disks, zvols, optical drives).
const SKIP_PREFIXES: [&str; 4] = ["loop", "zram", "zd", "sr"];

const SYS_BLOCK: &str = "/sys/block";

/// A protocol-classified, opened device handle.
#[derive(Debug)]
pub enum BlockDevice {
    Nvme(NvmeHandle),
    Ata(AtaHandle),
    Scsi(ScsiHandle),
}

/// A discovered device: its block-device name plus the open handle.
#[derive(Debug)]
pub struct Discovered {
    pub name: String,
    pub device: BlockDevice,
}

/// Enumerate and classify the host's block devices.
///
/// `skip` lists device names (not paths) to exclude on top of the
/// built-in virtual-device prefixes.
#[must_use]
pub fn discover(skip: &[String]) -> Vec<Discovered> {
    let entries = match fs::read_dir(SYS_BLOCK) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "failed to read {SYS_BLOCK}, no devices discovered");
            return Vec::new();
        }
    };

    let mut devices = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if SKIP_PREFIXES.iter().any(|p| name.starts_with(p)) {
            continue;
        }
        if skip.contains(&name) {
            debug!(dev = %name, "skipped by configuration");
            continue;
        }
        match classify(&name) {
            Ok(device) => devices.push(Discovered { name, device }),
            // Some devices (dm-crypt targets and friends) expose no
            // SMART interface at all.
            Err(e) => warn!(dev = %name, error = %e, "failed to open smart interface"),
        }
    }
    devices
}

/// Open `/dev/<name>` and classify its storage protocol.
pub fn classify(name: &str) -> Result<BlockDevice> {
    let path = format!("/dev/{name}");
    if name.starts_with("nvme") {
        return Ok(BlockDevice::Nvme(NvmeHandle::open(&path)?));
    }

    let ata = AtaHandle::open(&path)?;
    match ata.identify() {
        Ok(_) => Ok(BlockDevice::Ata(ata)),
        Err(e) => {
            debug!(dev = %name, error = %e, "not an ATA device, probing scsi");
            drop(ata);
            let scsi = ScsiHandle::open(&path)?;
            match scsi.inquiry() {
                Ok(_) => Ok(BlockDevice::Scsi(scsi)),
                Err(_) => Err(Error::UnsupportedDevice(name.to_string())),
            }
        }
    }
}
