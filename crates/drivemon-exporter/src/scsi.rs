//! SCSI decoder
//!
//! Placeholder: the access layer exposes no structured SMART telemetry
//! for SCSI targets, only the inquiry. The decoder exists so SCSI
//! devices stay classified and held by the aggregator instead of being
//! silently dropped; it contributes no observations today.

use crate::collector::ScrapeDevice;
use crate::desc::{MetricDesc, Observation};
use drivemon_common::Result;
use drivemon_device::ScsiHandle;
use std::sync::Arc;
use tracing::debug;

/// One SCSI device attached to the aggregator.
pub struct ScsiDev {
    name: String,
    handle: ScsiHandle,
}

impl ScsiDev {
    /// Wrap an open handle.
    pub fn new(name: impl Into<String>, handle: ScsiHandle) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }
}

impl ScrapeDevice for ScsiDev {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_metrics(&mut self) -> Vec<Arc<MetricDesc>> {
        // The inquiry validates the device still answers; there are no
        // descriptors to hand out.
        match self.handle.inquiry() {
            Ok(inquiry) => debug!(
                dev = %self.name,
                vendor = %inquiry.vendor,
                product = %inquiry.product,
                "scsi inquiry ok, no metrics exposed"
            ),
            Err(e) => debug!(dev = %self.name, error = %e, "scsi inquiry failed"),
        }
        Vec::new()
    }

    fn get_metrics(&mut self) -> Vec<Observation> {
        Vec::new()
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.handle.close()
    }
}
