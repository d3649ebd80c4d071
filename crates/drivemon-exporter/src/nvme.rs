//! NVMe decoder
//!
//! Turns the Identify structures and the SMART/health log page into
//! descriptors and observations. The descriptor set is fixed and
//! protocol-wide; device identity is decoded once at construction and
//! re-emitted on every collection cycle.

use crate::collector::ScrapeDevice;
use crate::desc::{MetricDesc, MetricKind, Observation, Registry};
use drivemon_common::{Result, capacity_string, u128_from_limbs, u128_to_f64};
use drivemon_device::{IdentifyController, IdentifyNamespace, NvmeHandle, NvmeSmartLog};
use std::sync::Arc;
use tracing::warn;

pub(crate) const TAG_DEV: &str = "dev";
pub(crate) const TAG_INDEX: &str = "index";

const NVME_CRIT_WARNING: &str = "smart_nvme_CritWarning";
const NVME_TEMPERATURE: &str = "smart_nvme_Temperature";
const NVME_AVAIL_SPARE: &str = "smart_nvme_AvailSpare";
const NVME_SPARE_THRESH: &str = "smart_nvme_SpareThresh";
const NVME_PERCENT_USED: &str = "smart_nvme_PercentUsed";
const NVME_ENDURANCE_CRIT_WARNING: &str = "smart_nvme_EnduranceCritWarning";
const NVME_DATA_UNITS_READ: &str = "smart_nvme_DataUnitsRead";
const NVME_DATA_UNITS_WRITTEN: &str = "smart_nvme_DataUnitsWritten";
const NVME_HOST_READS: &str = "smart_nvme_HostReads";
const NVME_HOST_WRITES: &str = "smart_nvme_HostWrites";
const NVME_CTRL_BUSY_TIME: &str = "smart_nvme_CtrlBusyTime";
const NVME_POWER_CYCLES: &str = "smart_nvme_PowerCycles";
const NVME_POWER_ON_HOURS: &str = "smart_nvme_PowerOnHours";
const NVME_UNSAFE_SHUTDOWNS: &str = "smart_nvme_UnsafeShutdowns";
const NVME_MEDIA_ERRORS: &str = "smart_nvme_MediaErrors";
const NVME_NUM_ERR_LOG_ENTRIES: &str = "smart_nvme_NumErrLogEntries";
const NVME_WARNING_TEMP_TIME: &str = "smart_nvme_WarningTempTime";
const NVME_CRIT_COMP_TIME: &str = "smart_nvme_CritCompTime";
const NVME_TEMP_SENSOR: &str = "smart_nvme_TempSensor";
const NVME_THERMAL_TRANSITION_COUNT: &str = "smart_nvme_ThermalTransitionCount";
const NVME_THERMAL_MANAGEMENT_TIME: &str = "smart_nvme_ThermalManagementTime";
const NVME_INFO: &str = "smart_nvme_Info";
const NVME_NAMESPACE_INFO: &str = "smart_nvme_NamespaceInfo";

/// Metric families labeled by device only.
const SCALAR_METRICS: [&str; 18] = [
    NVME_CRIT_WARNING,
    NVME_TEMPERATURE,
    NVME_AVAIL_SPARE,
    NVME_SPARE_THRESH,
    NVME_PERCENT_USED,
    NVME_ENDURANCE_CRIT_WARNING,
    NVME_DATA_UNITS_READ,
    NVME_DATA_UNITS_WRITTEN,
    NVME_HOST_READS,
    NVME_HOST_WRITES,
    NVME_CTRL_BUSY_TIME,
    NVME_POWER_CYCLES,
    NVME_POWER_ON_HOURS,
    NVME_UNSAFE_SHUTDOWNS,
    NVME_MEDIA_ERRORS,
    NVME_NUM_ERR_LOG_ENTRIES,
    NVME_WARNING_TEMP_TIME,
    NVME_CRIT_COMP_TIME,
];

/// Metric families fanned out per sensor/threshold index.
const INDEXED_METRICS: [&str; 3] = [
    NVME_TEMP_SENSOR,
    NVME_THERMAL_TRANSITION_COUNT,
    NVME_THERMAL_MANAGEMENT_TIME,
];

const INFO_LABELS: [&str; 11] = [
    TAG_DEV,
    "Model_Number",
    "Serial_Number",
    "Firmware_Version",
    "PCI_Vendor_Subsystem_ID",
    "IEEE_OUI_Identifier",
    "Total_NVM_Capacity",
    "Unallocated_NVM_Capacity",
    "Controller_ID",
    "NVMe_Version",
    "Number_of_Namespaces",
];

const NAMESPACE_INFO_LABELS: [&str; 5] = [
    TAG_DEV,
    "namespace",
    "Size_Capacity",
    "Formatted_LBA_Size",
    "IEEE_EUI_64",
];

/// Register the fixed, protocol-wide NVMe descriptor set. Idempotent.
pub fn register_nvme_metrics(registry: &Registry) {
    for name in SCALAR_METRICS {
        registry.register(name, "", &[TAG_DEV]);
    }
    for name in INDEXED_METRICS {
        registry.register(name, "", &[TAG_DEV, TAG_INDEX]);
    }
    registry.register(NVME_INFO, "", &INFO_LABELS);
    registry.register(NVME_NAMESPACE_INFO, "", &NAMESPACE_INFO_LABELS);
}

/// One NVMe device attached to the aggregator.
pub struct NvmeDev {
    name: String,
    handle: NvmeHandle,
    registry: Arc<Registry>,
    /// Identity label values, decoded once; the first entry is the
    /// device name even when identify fails.
    info: Vec<String>,
    /// Per-namespace identity label values.
    ns_info: Vec<Vec<String>>,
}

impl NvmeDev {
    /// Wrap an open handle, registering the descriptor set and decoding
    /// the device identity.
    pub fn new(name: impl Into<String>, handle: NvmeHandle, registry: Arc<Registry>) -> Self {
        let name = name.into();
        register_nvme_metrics(&registry);
        let (info, ns_info) = match handle.identify() {
            Ok((ctrl, namespaces)) => {
                let info = decode_info(&name, &ctrl, namespaces.len());
                let ns_info = namespaces
                    .iter()
                    .enumerate()
                    .map(|(index, ns)| decode_namespace_info(&name, index, ns))
                    .collect();
                (info, ns_info)
            }
            Err(e) => {
                warn!(dev = %name, error = %e, "identify failed, device info unavailable");
                let mut info = vec![String::new(); INFO_LABELS.len()];
                info[0].clone_from(&name);
                (info, Vec::new())
            }
        };
        Self {
            name,
            handle,
            registry,
            info,
            ns_info,
        }
    }
}

impl ScrapeDevice for NvmeDev {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_metrics(&mut self) -> Vec<Arc<MetricDesc>> {
        self.registry.all()
    }

    fn get_metrics(&mut self) -> Vec<Observation> {
        let log = match self.handle.read_smart_log() {
            Ok(log) => log,
            Err(e) => {
                warn!(dev = %self.name, error = %e, "failed to read health log");
                return Vec::new();
            }
        };
        let mut out = log_observations(&self.name, &log, &self.registry);
        push(
            &mut out,
            &self.registry,
            NVME_INFO,
            MetricKind::Gauge,
            0.0,
            self.info.clone(),
        );
        for ns in &self.ns_info {
            push(
                &mut out,
                &self.registry,
                NVME_NAMESPACE_INFO,
                MetricKind::Gauge,
                0.0,
                ns.clone(),
            );
        }
        out
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.handle.close()
    }
}

fn push(
    out: &mut Vec<Observation>,
    registry: &Registry,
    name: &str,
    kind: MetricKind,
    value: f64,
    label_values: Vec<String>,
) {
    let Some(desc) = registry.get(name) else {
        warn!(metric = name, "descriptor missing from registry");
        return;
    };
    out.push(Observation {
        desc,
        kind,
        value,
        label_values,
    });
}

/// Translate one health-log read into observations: instantaneous
/// state as gauges, accumulators as counters, composite fields fanned
/// out per index.
pub(crate) fn log_observations(
    dev: &str,
    log: &NvmeSmartLog,
    registry: &Registry,
) -> Vec<Observation> {
    let mut out = Vec::with_capacity(31);
    let dev_only = || vec![dev.to_string()];
    let indexed = |index: usize| vec![dev.to_string(), index.to_string()];

    let byte_gauges: [(&str, u8); 5] = [
        (NVME_CRIT_WARNING, log.critical_warning),
        (NVME_AVAIL_SPARE, log.avail_spare),
        (NVME_SPARE_THRESH, log.spare_thresh),
        (NVME_PERCENT_USED, log.percent_used),
        (NVME_ENDURANCE_CRIT_WARNING, log.endurance_crit_warning),
    ];
    for (name, value) in byte_gauges {
        push(
            &mut out,
            registry,
            name,
            MetricKind::Gauge,
            f64::from(value),
            dev_only(),
        );
    }

    let temperature = log.temperature;
    push(
        &mut out,
        registry,
        NVME_TEMPERATURE,
        MetricKind::Gauge,
        f64::from(temperature),
        dev_only(),
    );

    let sensors = log.temp_sensors;
    for (index, sensor) in sensors.iter().enumerate() {
        push(
            &mut out,
            registry,
            NVME_TEMP_SENSOR,
            MetricKind::Gauge,
            f64::from(*sensor),
            indexed(index),
        );
    }

    let wide_counters = [
        (NVME_DATA_UNITS_READ, log.data_units_read),
        (NVME_DATA_UNITS_WRITTEN, log.data_units_written),
        (NVME_HOST_READS, log.host_reads),
        (NVME_HOST_WRITES, log.host_writes),
        (NVME_CTRL_BUSY_TIME, log.ctrl_busy_time),
        (NVME_POWER_CYCLES, log.power_cycles),
        (NVME_POWER_ON_HOURS, log.power_on_hours),
        (NVME_UNSAFE_SHUTDOWNS, log.unsafe_shutdowns),
        (NVME_MEDIA_ERRORS, log.media_errors),
        (NVME_NUM_ERR_LOG_ENTRIES, log.num_err_log_entries),
    ];
    for (name, value) in wide_counters {
        push(
            &mut out,
            registry,
            name,
            MetricKind::Counter,
            u128_to_f64(value.lo, value.hi),
            dev_only(),
        );
    }

    let time_counters: [(&str, u32); 2] = [
        (NVME_WARNING_TEMP_TIME, log.warning_temp_time),
        (NVME_CRIT_COMP_TIME, log.crit_comp_time),
    ];
    for (name, value) in time_counters {
        push(
            &mut out,
            registry,
            name,
            MetricKind::Counter,
            f64::from(value),
            dev_only(),
        );
    }

    let paired_counters: [(&str, [u32; 2]); 2] = [
        (NVME_THERMAL_TRANSITION_COUNT, log.thermal_transition_count),
        (NVME_THERMAL_MANAGEMENT_TIME, log.thermal_management_time),
    ];
    for (name, values) in paired_counters {
        for (index, value) in values.iter().enumerate() {
            push(
                &mut out,
                registry,
                name,
                MetricKind::Counter,
                f64::from(*value),
                indexed(index),
            );
        }
    }

    out
}

/// Decode the controller identity into the `Info` label values.
pub(crate) fn decode_info(
    dev: &str,
    ctrl: &IdentifyController,
    namespace_count: usize,
) -> Vec<String> {
    let vid = ctrl.vid;
    let ieee = ctrl.ieee;
    let tnvmcap = ctrl.tnvmcap;
    let unvmcap = ctrl.unvmcap;
    let cntlid = ctrl.cntlid;
    let ver = ctrl.ver;
    vec![
        dev.to_string(),
        ctrl.model(),
        ctrl.serial(),
        ctrl.firmware(),
        format_u16_id(vid),
        format!("0x{}", hex::encode(ieee)),
        capacity_string(u128_from_limbs(tnvmcap.lo, tnvmcap.hi)),
        capacity_string(u128_from_limbs(unvmcap.lo, unvmcap.hi)),
        format_u16_id(cntlid),
        nvme_version(ver),
        namespace_count.to_string(),
    ]
}

/// Decode one namespace identity into the `NamespaceInfo` label values.
pub(crate) fn decode_namespace_info(
    dev: &str,
    index: usize,
    ns: &IdentifyNamespace,
) -> Vec<String> {
    let nsze = ns.nsze;
    let eui64 = ns.eui64;
    let lba_size = ns.lba_size();
    let size = u128::from(nsze) * u128::from(lba_size);
    vec![
        dev.to_string(),
        index.to_string(),
        capacity_string(size),
        lba_size.to_string(),
        format!("{} {}", hex::encode(&eui64[..4]), hex::encode(&eui64[4..])),
    ]
}

/// Render a 16-bit identifier as big-endian hex with a `0x` prefix.
pub(crate) fn format_u16_id(value: u16) -> String {
    format!("0x{}", hex::encode(value.to_be_bytes()))
}

/// Decode the 4-byte version word into `major.minor`. Controllers
/// reporting a non-zero tertiary byte get a literal `"?.?"` rather than
/// a guessed three-part version.
pub(crate) fn nvme_version(ver: u32) -> String {
    let bytes = ver.to_be_bytes();
    if bytes[3] != 0 {
        return "?.?".to_string();
    }
    format!("{}.{}", bytes[1], bytes[2])
}
