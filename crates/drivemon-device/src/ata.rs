//! ATA / SATA drive-command access
//!
//! IDENTIFY DEVICE and SMART READ DATA through the legacy drive-command
//! ioctl, which libata routes to the drive as an ATA passthrough. The
//! 512-byte payloads are decoded here into typed views.

use drivemon_common::{Error, Result};
use std::fs::File;
use std::os::fd::IntoRawFd;
use std::os::unix::io::AsRawFd;
use std::path::Path;

const HDIO_DRIVE_CMD: libc::c_ulong = 0x031f;

const ATA_CMD_IDENTIFY: u8 = 0xEC;
const ATA_CMD_SMART: u8 = 0xB0;
const SMART_READ_VALUES: u8 = 0xD0;

/// Entries in a SMART data block.
const ATTRIBUTE_SLOTS: usize = 30;

/// An open ATA block device.
#[derive(Debug)]
pub struct AtaHandle {
    file: File,
    path: String,
}

impl AtaHandle {
    /// Open an ATA block device node (e.g. `/dev/sda`).
    pub fn open(path: &str) -> Result<Self> {
        let file = File::open(Path::new(path)).map_err(|source| Error::DeviceOpen {
            path: path.to_string(),
            source,
        })?;
        Ok(Self {
            file,
            path: path.to_string(),
        })
    }

    /// Device node path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Issue a drive command returning one 512-byte data sector.
    fn drive_cmd(&self, command: u8, feature: u8, op: &'static str) -> Result<[u8; 512]> {
        // args[0..4] = command, sector number, feature, sector count;
        // the data sector follows. For SMART commands libata supplies
        // the LBA mid/high signature bytes itself.
        let mut args = [0u8; 4 + 512];
        args[0] = command;
        args[2] = feature;
        args[3] = 1;
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                HDIO_DRIVE_CMD,
                args.as_mut_ptr(),
            )
        };
        if rc != 0 {
            return Err(Error::Ioctl {
                op,
                device: self.path.clone(),
                source: nix::errno::Errno::last(),
            });
        }
        let mut data = [0u8; 512];
        data.copy_from_slice(&args[4..]);
        Ok(data)
    }

    /// Read and decode the IDENTIFY DEVICE block.
    pub fn identify(&self) -> Result<AtaIdentify> {
        let block = self.drive_cmd(ATA_CMD_IDENTIFY, 0, "identify device")?;
        Ok(AtaIdentify::parse(&block))
    }

    /// Read the current SMART attribute table.
    pub fn read_attributes(&self) -> Result<Vec<AtaAttribute>> {
        let block = self.drive_cmd(ATA_CMD_SMART, SMART_READ_VALUES, "smart read data")?;
        Ok(parse_attribute_table(&block))
    }

    /// Release the device node.
    pub fn close(self) -> Result<()> {
        let path = self.path;
        let fd = self.file.into_raw_fd();
        nix::unistd::close(fd).map_err(|source| Error::Close {
            device: path,
            source,
        })
    }
}

/// Decoded IDENTIFY DEVICE data.
#[derive(Debug, Clone)]
pub struct AtaIdentify {
    words: [u16; 256],
}

impl AtaIdentify {
    /// Decode a raw 512-byte identify block.
    #[must_use]
    pub fn parse(block: &[u8; 512]) -> Self {
        let mut words = [0u16; 256];
        for (i, w) in words.iter_mut().enumerate() {
            *w = u16::from_le_bytes([block[2 * i], block[2 * i + 1]]);
        }
        Self { words }
    }

    /// ATA strings store two characters per word, high byte first.
    fn ata_string(&self, start: usize, end: usize) -> String {
        let mut s = String::with_capacity((end - start) * 2);
        for &w in &self.words[start..end] {
            s.push((w >> 8) as u8 as char);
            s.push((w & 0xFF) as u8 as char);
        }
        s.trim().to_string()
    }

    /// Model number (words 27-46).
    #[must_use]
    pub fn model(&self) -> String {
        self.ata_string(27, 47)
    }

    /// Serial number (words 10-19).
    #[must_use]
    pub fn serial(&self) -> String {
        self.ata_string(10, 20)
    }

    /// Firmware revision (words 23-26).
    #[must_use]
    pub fn firmware(&self) -> String {
        self.ata_string(23, 27)
    }

    /// World wide name (words 108-111, most significant word first).
    #[must_use]
    pub fn wwn(&self) -> u64 {
        (u64::from(self.words[108]) << 48)
            | (u64::from(self.words[109]) << 32)
            | (u64::from(self.words[110]) << 16)
            | u64::from(self.words[111])
    }

    /// Nominal media rotation rate (word 217). 1 means non-rotating.
    #[must_use]
    pub fn rotation_rate(&self) -> u16 {
        self.words[217]
    }

    /// SATA capabilities (word 76).
    #[must_use]
    pub fn sata_cap(&self) -> u16 {
        self.words[76]
    }

    /// Additional SATA capabilities (word 77), carrying the current
    /// negotiated link speed.
    #[must_use]
    pub fn sata_cap_addl(&self) -> u16 {
        self.words[77]
    }

    /// Transport major version bitmask (word 222).
    #[must_use]
    pub fn transport_major(&self) -> u16 {
        self.words[222]
    }

    /// Addressable sector count: 48-bit field when populated, else the
    /// legacy 28-bit field.
    #[must_use]
    pub fn sectors(&self) -> u64 {
        let lba48 = u64::from(self.words[100])
            | (u64::from(self.words[101]) << 16)
            | (u64::from(self.words[102]) << 32)
            | (u64::from(self.words[103]) << 48);
        if lba48 != 0 {
            return lba48;
        }
        u64::from(self.words[60]) | (u64::from(self.words[61]) << 16)
    }

    /// Logical sector size in bytes (words 106, 117-118).
    #[must_use]
    pub fn logical_sector_size(&self) -> u32 {
        let info = self.words[106];
        // Word 106 is valid when bit 14 is set and bit 15 clear.
        if info & 0xC000 == 0x4000 && info & 0x1000 != 0 {
            let words = u32::from(self.words[117]) | (u32::from(self.words[118]) << 16);
            return words * 2;
        }
        512
    }

    /// Physical sector size in bytes (logical size shifted by the
    /// sectors-per-physical exponent in word 106).
    #[must_use]
    pub fn physical_sector_size(&self) -> u32 {
        let info = self.words[106];
        if info & 0xC000 == 0x4000 && info & 0x2000 != 0 {
            return self.logical_sector_size() << (info & 0x0F);
        }
        self.logical_sector_size()
    }

    /// Sector count, total capacity in bytes, and the logical/physical
    /// sector sizes, in one call.
    #[must_use]
    pub fn capacity(&self) -> (u64, u64, u32, u32) {
        let sectors = self.sectors();
        let logical = self.logical_sector_size();
        let physical = self.physical_sector_size();
        (sectors, sectors * u64::from(logical), logical, physical)
    }
}

/// One row of the SMART attribute table.
#[derive(Debug, Clone, Copy)]
pub struct AtaAttribute {
    pub id: u8,
    pub flags: u16,
    pub current: u8,
    pub worst: u8,
    /// 48-bit vendor raw register, assembled little-endian.
    pub raw: u64,
}

impl AtaAttribute {
    /// Well-known name for this attribute ID, if any.
    #[must_use]
    pub fn name(&self) -> Option<&'static str> {
        attribute_name(self.id)
    }

    /// Decode a temperature register (attributes 190/194) into current
    /// and, when populated, min/max degrees Celsius. The raw register
    /// packs the readings one per 16-bit word.
    pub fn parse_as_temperature(&self) -> Result<(i32, Option<i32>, Option<i32>)> {
        if self.id != 190 && self.id != 194 {
            return Err(Error::decode(
                "ata temperature",
                format!("attribute {} is not a temperature register", self.id),
            ));
        }
        let current = (self.raw & 0xFF) as i32;
        if current == 0 || current > 100 {
            return Err(Error::decode(
                "ata temperature",
                format!("implausible reading {current} in register {:#x}", self.raw),
            ));
        }
        let low = ((self.raw >> 16) & 0xFF) as i32;
        let high = ((self.raw >> 32) & 0xFF) as i32;
        let (min, max) = if low == 0 && high == 0 {
            (None, None)
        } else if low <= high {
            (Some(low), Some(high))
        } else {
            (Some(high), Some(low))
        };
        Ok((current, min, max))
    }
}

/// Parse a raw SMART READ DATA sector into its populated attribute rows.
#[must_use]
pub fn parse_attribute_table(block: &[u8; 512]) -> Vec<AtaAttribute> {
    let mut attrs = Vec::new();
    for slot in 0..ATTRIBUTE_SLOTS {
        let entry = &block[2 + slot * 12..2 + (slot + 1) * 12];
        let id = entry[0];
        if id == 0 {
            continue;
        }
        let raw = u64::from_le_bytes([
            entry[5], entry[6], entry[7], entry[8], entry[9], entry[10], 0, 0,
        ]);
        attrs.push(AtaAttribute {
            id,
            flags: u16::from_le_bytes([entry[1], entry[2]]),
            current: entry[3],
            worst: entry[4],
            raw,
        });
    }
    attrs
}

/// Conventional names for the well-known attribute IDs. Devices report
/// plenty of vendor-specific IDs beyond these; those stay unnamed.
#[must_use]
pub fn attribute_name(id: u8) -> Option<&'static str> {
    let name = match id {
        1 => "Raw_Read_Error_Rate",
        2 => "Throughput_Performance",
        3 => "Spin_Up_Time",
        4 => "Start_Stop_Count",
        5 => "Reallocated_Sector_Ct",
        7 => "Seek_Error_Rate",
        8 => "Seek_Time_Performance",
        9 => "Power_On_Hours",
        10 => "Spin_Retry_Count",
        11 => "Calibration_Retry_Count",
        12 => "Power_Cycle_Count",
        13 => "Read_Soft_Error_Rate",
        175 => "Program_Fail_Count_Chip",
        176 => "Erase_Fail_Count_Chip",
        177 => "Wear_Leveling_Count",
        179 => "Used_Rsvd_Blk_Cnt_Tot",
        180 => "Unused_Rsvd_Blk_Cnt_Tot",
        181 => "Program_Fail_Cnt_Total",
        182 => "Erase_Fail_Count_Total",
        183 => "Runtime_Bad_Block",
        184 => "End-to-End_Error",
        187 => "Reported_Uncorrect",
        188 => "Command_Timeout",
        189 => "High_Fly_Writes",
        190 => "Airflow_Temperature_Cel",
        191 => "G-Sense_Error_Rate",
        192 => "Power-Off_Retract_Count",
        193 => "Load_Cycle_Count",
        194 => "Temperature_Celsius",
        195 => "Hardware_ECC_Recovered",
        196 => "Reallocated_Event_Count",
        197 => "Current_Pending_Sector",
        198 => "Offline_Uncorrectable",
        199 => "UDMA_CRC_Error_Count",
        200 => "Multi_Zone_Error_Rate",
        201 => "Soft_Read_Error_Rate",
        220 => "Disk_Shift",
        222 => "Loaded_Hours",
        223 => "Load_Retry_Count",
        224 => "Load_Friction",
        226 => "Load-in_Time",
        227 => "Torq-amp_Count",
        230 => "Head_Amplitude",
        232 => "Available_Reservd_Space",
        233 => "Media_Wearout_Indicator",
        240 => "Head_Flying_Hours",
        241 => "Total_LBAs_Written",
        242 => "Total_LBAs_Read",
        254 => "Free_Fall_Sensor",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identify_fixture() -> AtaIdentify {
        let mut block = [0u8; 512];
        // Serial "S1Z8NB0K" at words 10.. : swap byte pairs per word.
        let serial = b"S1Z8NB0K            ";
        for (i, pair) in serial.chunks(2).enumerate() {
            block[20 + 2 * i] = pair[1];
            block[21 + 2 * i] = pair[0];
        }
        // Model at words 27..
        let model = b"Samsung SSD 860 EVO 1TB                 ";
        for (i, pair) in model.chunks(2).enumerate() {
            block[54 + 2 * i] = pair[1];
            block[55 + 2 * i] = pair[0];
        }
        // 48-bit sector count: 1953525168 sectors (word 100..)
        let sectors: u64 = 1_953_525_168;
        block[200..208].copy_from_slice(&sectors.to_le_bytes());
        // Word 217: rotation rate 1 (SSD)
        block[434] = 1;
        AtaIdentify::parse(&block)
    }

    #[test]
    fn test_identify_strings() {
        let id = identify_fixture();
        assert_eq!(id.serial(), "S1Z8NB0K");
        assert_eq!(id.model(), "Samsung SSD 860 EVO 1TB");
    }

    #[test]
    fn test_identify_capacity() {
        let id = identify_fixture();
        let (sectors, bytes, logical, physical) = id.capacity();
        assert_eq!(sectors, 1_953_525_168);
        assert_eq!(logical, 512);
        assert_eq!(physical, 512);
        assert_eq!(bytes, 1_953_525_168 * 512);
    }

    #[test]
    fn test_identify_rotation_rate() {
        assert_eq!(identify_fixture().rotation_rate(), 1);
    }

    #[test]
    fn test_parse_attribute_table() {
        let mut block = [0u8; 512];
        // Slot 0: attribute 5, current 100, worst 100, raw 7.
        block[2] = 5;
        block[5] = 100;
        block[6] = 100;
        block[7] = 7;
        // Slot 1: attribute 194, raw packs 45C current / 25C min / 52C max.
        block[14] = 194;
        block[17] = 55;
        block[18] = 45;
        let raw: u64 = 45 | (25 << 16) | (52 << 32);
        block[19..25].copy_from_slice(&raw.to_le_bytes()[..6]);

        let attrs = parse_attribute_table(&block);
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].id, 5);
        assert_eq!(attrs[0].raw, 7);
        assert_eq!(attrs[0].name(), Some("Reallocated_Sector_Ct"));

        assert_eq!(attrs[1].id, 194);
        let (current, min, max) = attrs[1].parse_as_temperature().unwrap();
        assert_eq!(current, 45);
        assert_eq!(min, Some(25));
        assert_eq!(max, Some(52));
    }

    #[test]
    fn test_temperature_rejects_other_ids() {
        let attr = AtaAttribute {
            id: 5,
            flags: 0,
            current: 100,
            worst: 100,
            raw: 45,
        };
        assert!(attr.parse_as_temperature().is_err());
    }

    #[test]
    fn test_temperature_rejects_implausible() {
        let attr = AtaAttribute {
            id: 194,
            flags: 0,
            current: 100,
            worst: 100,
            raw: 0,
        };
        assert!(attr.parse_as_temperature().is_err());
    }

    #[test]
    fn test_attribute_names() {
        assert_eq!(attribute_name(9), Some("Power_On_Hours"));
        assert_eq!(attribute_name(192), Some("Power-Off_Retract_Count"));
        assert_eq!(attribute_name(111), None);
    }
}
