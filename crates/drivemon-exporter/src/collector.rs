//! Device aggregator
//!
//! Owns the discovered devices and implements the two-phase scrape
//! contract: `describe` surfaces each metric family's identity exactly
//! once over the aggregator's lifetime, `collect` fans out to every
//! device and forwards whatever observations come back. One device
//! failing never blocks the others.

use crate::desc::{MetricDesc, Observation, Registry};
use crate::nvme::NvmeDev;
use crate::sata::SataDev;
use crate::scsi::ScsiDev;
use drivemon_common::Result;
use drivemon_device::{BlockDevice, Discovered};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, warn};

/// Capability contract every protocol decoder implements.
pub trait ScrapeDevice: Send {
    /// Block-device name (e.g. `sda`, `nvme0n1`).
    fn name(&self) -> &str;

    /// Every metric descriptor this device could emit. May read the
    /// device to discover them; must be idempotent in the resulting
    /// descriptor set against an unchanged device.
    fn list_metrics(&mut self) -> Vec<Arc<MetricDesc>>;

    /// Current observations. A read failure yields an empty sequence;
    /// the device is simply skipped for this cycle.
    fn get_metrics(&mut self) -> Vec<Observation>;

    /// Release the underlying handle.
    fn close(self: Box<Self>) -> Result<()>;
}

/// The device aggregator driven by the scrape endpoint.
pub struct Collector {
    devices: Vec<Box<dyn ScrapeDevice>>,
    /// Descriptor names already surfaced through `describe`. Grows for
    /// the collector's whole lifetime and is never reset.
    seen_names: HashSet<String>,
}

impl Collector {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            seen_names: HashSet::new(),
        }
    }

    /// Build a collector from discovery output, wiring each protocol's
    /// devices to that protocol's shared descriptor registry.
    #[must_use]
    pub fn from_devices(discovered: Vec<Discovered>) -> Self {
        let nvme_registry = Arc::new(Registry::new());
        let sata_registry = Arc::new(Registry::new());
        let mut collector = Self::new();
        for entry in discovered {
            match entry.device {
                BlockDevice::Nvme(handle) => collector.push(Box::new(NvmeDev::new(
                    entry.name,
                    handle,
                    Arc::clone(&nvme_registry),
                ))),
                BlockDevice::Ata(handle) => collector.push(Box::new(SataDev::new(
                    entry.name,
                    handle,
                    Arc::clone(&sata_registry),
                ))),
                BlockDevice::Scsi(handle) => {
                    collector.push(Box::new(ScsiDev::new(entry.name, handle)));
                }
            }
        }
        collector
    }

    /// Attach a device.
    pub fn push(&mut self, device: Box<dyn ScrapeDevice>) {
        self.devices.push(device);
    }

    /// Number of attached devices.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Describe phase: the union of every device's descriptors,
    /// deduplicated by name across the whole collector. A name is
    /// surfaced at most once, ever — repeat calls return only names
    /// never seen before.
    pub fn describe(&mut self) -> Vec<Arc<MetricDesc>> {
        let mut out = Vec::new();
        for device in &mut self.devices {
            for desc in device.list_metrics() {
                if self.seen_names.contains(&desc.name) {
                    continue;
                }
                self.seen_names.insert(desc.name.clone());
                out.push(desc);
            }
        }
        out
    }

    /// Collect phase: every device's current observations. Observations
    /// with a label count that does not match their descriptor are
    /// dropped individually; siblings and other devices are unaffected.
    pub fn collect(&mut self) -> Vec<Observation> {
        let mut out = Vec::new();
        for device in &mut self.devices {
            for obs in device.get_metrics() {
                if !obs.label_arity_matches() {
                    warn!(
                        metric = %obs.desc.name,
                        expected = obs.desc.labels.len(),
                        got = obs.label_values.len(),
                        "label arity mismatch, dropping observation"
                    );
                    continue;
                }
                out.push(obs);
            }
        }
        out
    }

    /// Release every device handle. Close failures are logged; shutdown
    /// proceeds regardless.
    pub fn close(&mut self) {
        for device in self.devices.drain(..) {
            let name = device.name().to_string();
            if let Err(e) = device.close() {
                error!(dev = %name, error = %e, "failed to close device");
            }
        }
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::MetricKind;

    /// Scripted stand-in for a protocol decoder.
    struct FakeDev {
        name: String,
        descs: Vec<Arc<MetricDesc>>,
        /// Observations returned on every cycle.
        repeating: Vec<Observation>,
        /// Observations returned on the first cycle only.
        once: Vec<Observation>,
        fail_reads: bool,
        cycles: usize,
    }

    impl FakeDev {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                descs: Vec::new(),
                repeating: Vec::new(),
                once: Vec::new(),
                fail_reads: false,
                cycles: 0,
            }
        }

        fn desc(&mut self, name: &str, labels: &[&str]) -> Arc<MetricDesc> {
            let desc = Arc::new(MetricDesc::new(name, "", labels));
            self.descs.push(Arc::clone(&desc));
            desc
        }

        fn gauge(desc: &Arc<MetricDesc>, value: f64, labels: &[&str]) -> Observation {
            Observation {
                desc: Arc::clone(desc),
                kind: MetricKind::Gauge,
                value,
                label_values: labels.iter().map(|l| (*l).to_string()).collect(),
            }
        }
    }

    impl ScrapeDevice for FakeDev {
        fn name(&self) -> &str {
            &self.name
        }

        fn list_metrics(&mut self) -> Vec<Arc<MetricDesc>> {
            self.descs.clone()
        }

        fn get_metrics(&mut self) -> Vec<Observation> {
            if self.fail_reads {
                return Vec::new();
            }
            self.cycles += 1;
            let mut out = self.repeating.clone();
            if self.cycles == 1 {
                out.extend(self.once.clone());
            }
            out
        }

        fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_describe_dedups_across_devices_and_calls() {
        let mut a = FakeDev::new("sda");
        a.desc("smart_sata_Power_On_Hours", &["dev"]);
        a.desc("smart_sata_Info", &["dev"]);
        let mut b = FakeDev::new("sdb");
        b.desc("smart_sata_Power_On_Hours", &["dev"]);
        b.desc("smart_sata_Temperature_Celsius", &["dev"]);

        let mut collector = Collector::new();
        collector.push(Box::new(a));
        collector.push(Box::new(b));

        let first: Vec<String> = collector
            .describe()
            .iter()
            .map(|d| d.name.clone())
            .collect();
        assert_eq!(first.len(), 3);
        assert!(first.contains(&"smart_sata_Power_On_Hours".to_string()));

        // Names already surfaced are never surfaced again.
        assert!(collector.describe().is_empty());
    }

    #[test]
    fn test_collect_one_shot_vs_repeating_identity() {
        // A SATA-like device emits its identity once; an NVMe-like
        // device re-emits its identity every cycle.
        let mut sata = FakeDev::new("sda");
        let sata_info = sata.desc("smart_sata_Info", &["dev", "Device_Model"]);
        let sata_attr = sata.desc("smart_sata_Power_On_Hours", &["dev"]);
        sata.repeating = vec![FakeDev::gauge(&sata_attr, 423.0, &["sda"])];
        sata.once = vec![FakeDev::gauge(&sata_info, 0.0, &["sda", "Disk"])];

        let mut nvme = FakeDev::new("nvme0n1");
        let nvme_info = nvme.desc("smart_nvme_Info", &["dev", "Model_Number"]);
        nvme.repeating = vec![FakeDev::gauge(&nvme_info, 0.0, &["nvme0n1", "SSD"])];

        let mut collector = Collector::new();
        collector.push(Box::new(sata));
        collector.push(Box::new(nvme));
        collector.describe();

        let count = |obs: &[Observation], name: &str| {
            obs.iter().filter(|o| o.desc.name == name).count()
        };

        let first = collector.collect();
        assert_eq!(count(&first, "smart_sata_Info"), 1);
        assert_eq!(count(&first, "smart_nvme_Info"), 1);

        let second = collector.collect();
        assert_eq!(count(&second, "smart_sata_Info"), 0);
        assert_eq!(count(&second, "smart_nvme_Info"), 1);
        assert_eq!(count(&second, "smart_sata_Power_On_Hours"), 1);
    }

    #[test]
    fn test_collect_survives_failing_device() {
        let mut bad = FakeDev::new("sda");
        let bad_desc = bad.desc("smart_sata_Power_On_Hours", &["dev"]);
        bad.repeating = vec![FakeDev::gauge(&bad_desc, 1.0, &["sda"])];
        bad.fail_reads = true;

        let mut good = FakeDev::new("sdb");
        let good_desc = good.desc("smart_sata_Start_Stop_Count", &["dev"]);
        good.repeating = vec![FakeDev::gauge(&good_desc, 7.0, &["sdb"])];

        let mut collector = Collector::new();
        collector.push(Box::new(bad));
        collector.push(Box::new(good));

        let obs = collector.collect();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].desc.name, "smart_sata_Start_Stop_Count");
        assert_eq!(obs[0].value, 7.0);
    }

    #[test]
    fn test_collect_drops_arity_mismatch_only() {
        let mut dev = FakeDev::new("sda");
        let indexed = dev.desc("smart_nvme_TempSensor", &["dev", "index"]);
        let plain = dev.desc("smart_nvme_Temperature", &["dev"]);
        dev.repeating = vec![
            // Missing the index label: dropped.
            FakeDev::gauge(&indexed, 310.0, &["sda"]),
            FakeDev::gauge(&plain, 310.0, &["sda"]),
        ];

        let mut collector = Collector::new();
        collector.push(Box::new(dev));

        let obs = collector.collect();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].desc.name, "smart_nvme_Temperature");
    }

    #[test]
    fn test_close_empties_collector() {
        let mut collector = Collector::new();
        collector.push(Box::new(FakeDev::new("sda")));
        assert_eq!(collector.device_count(), 1);
        collector.close();
        assert_eq!(collector.device_count(), 0);
    }

    #[test]
    fn test_tolerates_empty_decoder() {
        // A device that yields neither descriptors nor observations
        // (the SCSI case) must not disturb the phases.
        let empty = FakeDev::new("sdc");
        let mut collector = Collector::new();
        collector.push(Box::new(empty));
        assert!(collector.describe().is_empty());
        assert!(collector.collect().is_empty());
    }
}
