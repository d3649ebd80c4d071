//! NVMe admin-command access
//!
//! Identify and SMART/health-log structures with the passthrough ioctl
//! that reads them. Layouts follow the NVMe base specification; fields
//! this crate never reads are folded into reserved byte runs.

use drivemon_common::{Error, Result};
use std::fs::File;
use std::os::fd::IntoRawFd;
use std::os::unix::io::AsRawFd;

const ADMIN_GET_LOG_PAGE: u8 = 0x02;
const ADMIN_IDENTIFY: u8 = 0x06;

const LOG_PAGE_SMART: u32 = 0x02;

const CNS_NAMESPACE: u32 = 0x00;
const CNS_CONTROLLER: u32 = 0x01;
const CNS_ACTIVE_NS_LIST: u32 = 0x02;

/// NVME_IOCTL_ADMIN_CMD
nix::ioctl_readwrite!(nvme_admin_cmd, b'N', 0x41, NvmePassthruCmd);

/// Admin passthrough command block, as the kernel expects it.
#[repr(C)]
#[derive(Debug, Default)]
pub struct NvmePassthruCmd {
    pub opcode: u8,
    pub flags: u8,
    pub rsvd1: u16,
    pub nsid: u32,
    pub cdw2: u32,
    pub cdw3: u32,
    pub metadata: u64,
    pub addr: u64,
    pub metadata_len: u32,
    pub data_len: u32,
    pub cdw10: u32,
    pub cdw11: u32,
    pub cdw12: u32,
    pub cdw13: u32,
    pub cdw14: u32,
    pub cdw15: u32,
    pub timeout_ms: u32,
    pub result: u32,
}

/// A 128-bit little-endian counter as two 64-bit limbs.
#[repr(C, packed)]
#[derive(Debug, Default, Clone, Copy)]
pub struct U128Le {
    pub lo: u64,
    pub hi: u64,
}

/// SMART / health information log page (512 bytes).
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct NvmeSmartLog {
    pub critical_warning: u8,
    /// Composite temperature, Kelvin.
    pub temperature: u16,
    pub avail_spare: u8,
    pub spare_thresh: u8,
    pub percent_used: u8,
    pub endurance_crit_warning: u8,
    _rsvd7: [u8; 25],
    pub data_units_read: U128Le,
    pub data_units_written: U128Le,
    pub host_reads: U128Le,
    pub host_writes: U128Le,
    pub ctrl_busy_time: U128Le,
    pub power_cycles: U128Le,
    pub power_on_hours: U128Le,
    pub unsafe_shutdowns: U128Le,
    pub media_errors: U128Le,
    pub num_err_log_entries: U128Le,
    pub warning_temp_time: u32,
    pub crit_comp_time: u32,
    pub temp_sensors: [u16; 8],
    pub thermal_transition_count: [u32; 2],
    pub thermal_management_time: [u32; 2],
    _rsvd232: [u8; 280],
}

impl Default for NvmeSmartLog {
    fn default() -> Self {
        // All-zero is a valid (empty) log page.
        unsafe { std::mem::zeroed() }
    }
}

/// Identify Controller data structure (4096 bytes).
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct IdentifyController {
    pub vid: u16,
    pub ssvid: u16,
    pub sn: [u8; 20],
    pub mn: [u8; 40],
    pub fr: [u8; 8],
    pub rab: u8,
    pub ieee: [u8; 3],
    pub cmic: u8,
    pub mdts: u8,
    pub cntlid: u16,
    pub ver: u32,
    _rsvd84: [u8; 196],
    pub tnvmcap: U128Le,
    pub unvmcap: U128Le,
    _rsvd312: [u8; 204],
    pub nn: u32,
    _rsvd520: [u8; 3576],
}

impl Default for IdentifyController {
    fn default() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

impl IdentifyController {
    /// Model number, trimmed.
    #[must_use]
    pub fn model(&self) -> String {
        ascii_field(&self.mn)
    }

    /// Serial number, trimmed.
    #[must_use]
    pub fn serial(&self) -> String {
        ascii_field(&self.sn)
    }

    /// Firmware revision, trimmed.
    #[must_use]
    pub fn firmware(&self) -> String {
        ascii_field(&self.fr)
    }
}

/// Identify Namespace data structure (4096 bytes).
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct IdentifyNamespace {
    pub nsze: u64,
    pub ncap: u64,
    pub nuse: u64,
    pub nsfeat: u8,
    pub nlbaf: u8,
    pub flbas: u8,
    _rsvd27: [u8; 93],
    pub eui64: [u8; 8],
    /// LBA formats: each word packs metadata size, LBA data size (as a
    /// power of two) and relative performance.
    pub lbaf: [u32; 16],
    _rsvd192: [u8; 3904],
}

impl Default for IdentifyNamespace {
    fn default() -> Self {
        unsafe { std::mem::zeroed() }
    }
}

impl IdentifyNamespace {
    /// Size in bytes of one logical block, from the currently formatted
    /// LBA format.
    #[must_use]
    pub fn lba_size(&self) -> u64 {
        let index = (self.flbas & 0x0F) as usize;
        let formats = self.lbaf;
        let lbads = (formats[index] >> 16) & 0xFF;
        1u64 << lbads
    }
}

fn ascii_field(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

/// An open NVMe controller character device.
#[derive(Debug)]
pub struct NvmeHandle {
    file: File,
    path: String,
}

impl NvmeHandle {
    /// Open an NVMe controller node (e.g. `/dev/nvme0`).
    pub fn open(path: &str) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::DeviceOpen {
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

    fn admin(&self, cmd: &mut NvmePassthruCmd, op: &'static str) -> Result<()> {
        let rc = unsafe { nvme_admin_cmd(self.file.as_raw_fd(), cmd) };
        rc.map(drop).map_err(|source| Error::Ioctl {
            op,
            device: self.path.clone(),
            source,
        })
    }

    /// Identify the controller and its active namespaces.
    pub fn identify(&self) -> Result<(IdentifyController, Vec<IdentifyNamespace>)> {
        let controller = self.identify_controller()?;
        let namespaces = self.identify_namespaces()?;
        Ok((controller, namespaces))
    }

    fn identify_controller(&self) -> Result<IdentifyController> {
        let mut id = IdentifyController::default();
        let mut cmd = NvmePassthruCmd {
            opcode: ADMIN_IDENTIFY,
            addr: std::ptr::from_mut(&mut id) as u64,
            data_len: std::mem::size_of::<IdentifyController>() as u32,
            cdw10: CNS_CONTROLLER,
            ..Default::default()
        };
        self.admin(&mut cmd, "identify controller")?;
        Ok(id)
    }

    fn identify_namespaces(&self) -> Result<Vec<IdentifyNamespace>> {
        // Active namespace ID list: up to 1024 little-endian u32 ids,
        // zero-terminated.
        let mut ids = [0u32; 1024];
        let mut cmd = NvmePassthruCmd {
            opcode: ADMIN_IDENTIFY,
            addr: ids.as_mut_ptr() as u64,
            data_len: std::mem::size_of_val(&ids) as u32,
            cdw10: CNS_ACTIVE_NS_LIST,
            ..Default::default()
        };
        self.admin(&mut cmd, "identify active namespace list")?;

        let mut namespaces = Vec::new();
        for &nsid in ids.iter().take_while(|&&nsid| nsid != 0) {
            namespaces.push(self.identify_namespace(nsid)?);
        }
        Ok(namespaces)
    }

    fn identify_namespace(&self, nsid: u32) -> Result<IdentifyNamespace> {
        let mut ns = IdentifyNamespace::default();
        let mut cmd = NvmePassthruCmd {
            opcode: ADMIN_IDENTIFY,
            nsid,
            addr: std::ptr::from_mut(&mut ns) as u64,
            data_len: std::mem::size_of::<IdentifyNamespace>() as u32,
            cdw10: CNS_NAMESPACE,
            ..Default::default()
        };
        self.admin(&mut cmd, "identify namespace")?;
        Ok(ns)
    }

    /// Read the controller-wide SMART / health log page.
    pub fn read_smart_log(&self) -> Result<NvmeSmartLog> {
        let mut log = NvmeSmartLog::default();
        let data_len = std::mem::size_of::<NvmeSmartLog>() as u32;
        // Number of dwords, zero-based, in the upper half of cdw10.
        let numd = data_len / 4 - 1;
        let mut cmd = NvmePassthruCmd {
            opcode: ADMIN_GET_LOG_PAGE,
            nsid: 0xFFFF_FFFF,
            addr: std::ptr::from_mut(&mut log) as u64,
            data_len,
            cdw10: LOG_PAGE_SMART | (numd << 16),
            ..Default::default()
        };
        self.admin(&mut cmd, "get smart log page")?;
        Ok(log)
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
