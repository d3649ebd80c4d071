//! SATA decoder
//!
//! The ATA attribute table is vendor-extensible, so descriptors are
//! discovered from the device rather than fixed: one per attribute ID
//! present, accumulated lazily in a registry shared by every SATA
//! device (attribute naming is identical across them). Device identity
//! is emitted exactly once over a device's lifetime.

use crate::collector::ScrapeDevice;
use crate::desc::{MetricDesc, MetricKind, Observation, Registry};
use crate::nvme::TAG_DEV;
use drivemon_common::{Result, capacity_string, comma_grouped};
use drivemon_device::{AtaHandle, AtaIdentify};
use std::sync::Arc;
use tracing::warn;

const METRIC_SATA: &str = "smart_sata_";
const SATA_INFO_METRIC: &str = "smart_sata_Info";

const INFO_LABELS: [&str; 10] = [
    TAG_DEV,
    "Device_Model",
    "Serial_Number",
    "LU_WWN_Device_Id",
    "Firmware_Version",
    "User_Capacity",
    "Sector_Sizes",
    "Sectors",
    "Rotation_Rate",
    "SATA_Version",
];

/// Vendor register disabled on the supported hardware; excluded from
/// output entirely.
const ATTR_DISABLED: u8 = 231;
const ATTR_SPIN_UP_TIME: u8 = 3;
const ATTR_TEMPERATURE: u8 = 194;

/// Derive the metric name for an attribute. Pure: depends only on the
/// reported name and ID.
#[must_use]
pub fn metric_name(attr_name: &str, id: u8) -> String {
    match attr_name {
        "" => format!("{METRIC_SATA}Unknown_Attribute_{}", to_hex(id)),
        // The vendor string carries a character that is invalid in a
        // metric name; remap it to its underscore form.
        "Power-Off_Retract_Count" => format!("{METRIC_SATA}Power_Off_Retract_Count"),
        name => format!("{METRIC_SATA}{name}"),
    }
}

/// Two-digit uppercase hex rendering of an attribute ID.
pub(crate) fn to_hex(id: u8) -> String {
    format!("{id:02X}")
}

/// Unpack the spin-up-time register: the low 12 bits are the current
/// spin-up time, bits 16-27 the lifetime average. Returns
/// `(current, average)`; only `current` feeds the emitted observation.
#[must_use]
pub fn parse_spin_up_time(raw: u64) -> (u64, u64) {
    let current = raw & 0xFFF;
    let average = (raw & 0x0FFF_0000) >> 16;
    (current, average)
}

const SATA1_SPEED: &str = "1.5 Gb/s";
const SATA2_SPEED: &str = "3.0 Gb/s";
const SATA3_SPEED: &str = "6.0 Gb/s";

const SATA_VERSIONS: [&str; 10] = [
    "ATA8-AST",
    "SATA 1.0a",
    "SATA II Ext",
    "SATA 2.5",
    "SATA 2.6",
    "SATA 3.0",
    "SATA 3.1",
    "SATA 3.2",
    "SATA 3.3",
    "SATA 3.4",
];

fn floor_log2(x: u16) -> usize {
    if x == 0 {
        0
    } else {
        15 - x.leading_zeros() as usize
    }
}

fn supported_speed(sata_cap: u16) -> &'static str {
    if sata_cap & 0x0008 != 0 {
        SATA3_SPEED
    } else if sata_cap & 0x0004 != 0 {
        SATA2_SPEED
    } else if sata_cap & 0x0002 != 0 {
        SATA1_SPEED
    } else {
        "unknown"
    }
}

fn negotiated_speed(sata_cap_addl: u16) -> &'static str {
    match sata_cap_addl & 0xe {
        2 => SATA1_SPEED,
        4 => SATA2_SPEED,
        6 => SATA3_SPEED,
        _ => "",
    }
}

/// Derive the composite link description:
/// `"<version>, <max speed> (current <negotiated speed>)"`. The version
/// comes from the highest bit set in the transport-major mask, mapped
/// through the fixed name table.
#[must_use]
pub fn sata_version(transport_major: u16, sata_cap: u16, sata_cap_addl: u16) -> String {
    let version = SATA_VERSIONS
        .get(floor_log2(transport_major & 0x0fff))
        .copied()
        .unwrap_or("");
    format!(
        "{}, {} (current {})",
        version,
        supported_speed(sata_cap),
        negotiated_speed(sata_cap_addl)
    )
}

/// One SATA device attached to the aggregator.
pub struct SataDev {
    name: String,
    handle: AtaHandle,
    registry: Arc<Registry>,
    info_sent: bool,
}

impl SataDev {
    /// Wrap an open handle. `registry` is the protocol-scoped SATA
    /// registry shared across devices.
    pub fn new(name: impl Into<String>, handle: AtaHandle, registry: Arc<Registry>) -> Self {
        Self {
            name: name.into(),
            handle,
            registry,
            info_sent: false,
        }
    }

    fn info_label_values(&self, id: &AtaIdentify) -> Vec<String> {
        let (sectors, capacity, logical, physical) = id.capacity();
        vec![
            self.name.clone(),
            id.model(),
            id.serial(),
            format!("{:x}", id.wwn()),
            id.firmware(),
            capacity_string(u128::from(capacity)),
            format!("{logical} bytes logical, {physical} bytes physical"),
            comma_grouped(u128::from(sectors)),
            format!("{} rpm", id.rotation_rate()),
            sata_version(id.transport_major(), id.sata_cap(), id.sata_cap_addl()),
        ]
    }
}

impl ScrapeDevice for SataDev {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_metrics(&mut self) -> Vec<Arc<MetricDesc>> {
        let attrs = match self.handle.read_attributes() {
            Ok(attrs) => attrs,
            Err(e) => {
                warn!(dev = %self.name, error = %e, "failed to read attribute table");
                return self.registry.all();
            }
        };
        for attr in &attrs {
            let name = metric_name(attr.name().unwrap_or(""), attr.id);
            self.registry
                .register(&name, &to_hex(attr.id), &[TAG_DEV]);
        }
        self.registry.register(SATA_INFO_METRIC, "", &INFO_LABELS);
        self.registry.all()
    }

    fn get_metrics(&mut self) -> Vec<Observation> {
        let attrs = match self.handle.read_attributes() {
            Ok(attrs) => attrs,
            Err(e) => {
                warn!(dev = %self.name, error = %e, "failed to read attribute table");
                return Vec::new();
            }
        };

        let mut out = Vec::with_capacity(attrs.len());
        for attr in &attrs {
            let name = metric_name(attr.name().unwrap_or(""), attr.id);
            let Some(desc) = self.registry.get(&name) else {
                warn!(metric = %name, "failed to find metric, didn't run list_metrics?");
                continue;
            };
            let value = match attr.id {
                ATTR_DISABLED => continue,
                ATTR_TEMPERATURE => match attr.parse_as_temperature() {
                    Ok((current, _, _)) => f64::from(current),
                    Err(e) => {
                        warn!(dev = %self.name, error = %e, "failed to parse temperature");
                        continue;
                    }
                },
                ATTR_SPIN_UP_TIME => {
                    let (current, _average) = parse_spin_up_time(attr.raw);
                    current as f64
                }
                _ => attr.raw as f64,
            };
            out.push(Observation {
                desc,
                kind: MetricKind::Gauge,
                value,
                label_values: vec![self.name.clone()],
            });
        }

        if !self.info_sent {
            if let Some(desc) = self.registry.get(SATA_INFO_METRIC) {
                self.info_sent = true;
                match self.handle.identify() {
                    Ok(id) => out.push(Observation {
                        desc,
                        kind: MetricKind::Gauge,
                        value: 0.0,
                        label_values: self.info_label_values(&id),
                    }),
                    Err(e) => {
                        warn!(dev = %self.name, error = %e, "identify failed, device info unavailable");
                    }
                }
            }
        }
        out
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.handle.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_name_known() {
        assert_eq!(
            metric_name("Power_On_Hours", 9),
            "smart_sata_Power_On_Hours"
        );
        // Pure and stable across repeated calls.
        assert_eq!(metric_name("Power_On_Hours", 9), metric_name("Power_On_Hours", 9));
    }

    #[test]
    fn test_metric_name_unknown() {
        assert_eq!(
            metric_name("", 0xAB),
            "smart_sata_Unknown_Attribute_AB"
        );
        assert_eq!(metric_name("", 7), "smart_sata_Unknown_Attribute_07");
    }

    #[test]
    fn test_metric_name_power_off_retract_remap() {
        assert_eq!(
            metric_name("Power-Off_Retract_Count", 192),
            "smart_sata_Power_Off_Retract_Count"
        );
    }

    #[test]
    fn test_parse_spin_up_time() {
        // Reference register observed in the field.
        let (current, average) = parse_spin_up_time(38_684_000_679);
        assert_eq!(current, 423);
        assert_eq!(average, 447);
    }

    #[test]
    fn test_parse_spin_up_time_masks() {
        assert_eq!(parse_spin_up_time(0), (0, 0));
        assert_eq!(parse_spin_up_time(0xFFF), (0xFFF, 0));
        assert_eq!(parse_spin_up_time(0x0FFF_0000), (0, 0xFFF));
    }

    #[test]
    fn test_floor_log2() {
        assert_eq!(floor_log2(0), 0);
        assert_eq!(floor_log2(1), 0);
        assert_eq!(floor_log2(0x20), 5);
        assert_eq!(floor_log2(0x3F), 5);
    }

    #[test]
    fn test_supported_speed() {
        // Bit 3 wins regardless of lower bits.
        assert_eq!(supported_speed(0x000E), "6.0 Gb/s");
        assert_eq!(supported_speed(0x0008), "6.0 Gb/s");
        assert_eq!(supported_speed(0x0006), "3.0 Gb/s");
        assert_eq!(supported_speed(0x0002), "1.5 Gb/s");
        assert_eq!(supported_speed(0x0000), "unknown");
    }

    #[test]
    fn test_negotiated_speed() {
        assert_eq!(negotiated_speed(0x0002), "1.5 Gb/s");
        assert_eq!(negotiated_speed(0x0004), "3.0 Gb/s");
        assert_eq!(negotiated_speed(0x0006), "6.0 Gb/s");
        assert_eq!(negotiated_speed(0x0000), "");
    }

    #[test]
    fn test_sata_version() {
        // Transport-major bit 5 set, nothing higher.
        assert_eq!(
            sata_version(0x0020, 0x000E, 0x0006),
            "SATA 3.0, 6.0 Gb/s (current 6.0 Gb/s)"
        );
        assert_eq!(
            sata_version(0x0002, 0x0002, 0x0002),
            "SATA 1.0a, 1.5 Gb/s (current 1.5 Gb/s)"
        );
    }
}
