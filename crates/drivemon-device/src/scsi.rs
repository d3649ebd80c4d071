//! SCSI generic access
//!
//! Only INQUIRY is wired up: the access layer exposes no structured
//! SMART telemetry for plain SCSI targets, but the inquiry lets the
//! exporter keep such devices classified instead of dropping them.

use drivemon_common::{Error, Result};
use std::fs::File;
use std::os::fd::IntoRawFd;
use std::os::unix::io::AsRawFd;

const SG_IO: libc::c_ulong = 0x2285;
const SG_DXFER_FROM_DEV: libc::c_int = -3;

const INQUIRY: u8 = 0x12;
const INQUIRY_REPLY_LEN: usize = 96;
const SENSE_LEN: usize = 32;

/// `sg_io_hdr` from `<scsi/sg.h>`.
#[repr(C)]
struct SgIoHdr {
    interface_id: libc::c_int,
    dxfer_direction: libc::c_int,
    cmd_len: libc::c_uchar,
    mx_sb_len: libc::c_uchar,
    iovec_count: libc::c_ushort,
    dxfer_len: libc::c_uint,
    dxferp: *mut libc::c_void,
    cmdp: *mut libc::c_uchar,
    sbp: *mut libc::c_uchar,
    timeout: libc::c_uint,
    flags: libc::c_uint,
    pack_id: libc::c_int,
    usr_ptr: *mut libc::c_void,
    status: libc::c_uchar,
    masked_status: libc::c_uchar,
    msg_status: libc::c_uchar,
    sb_len_wr: libc::c_uchar,
    host_status: libc::c_ushort,
    driver_status: libc::c_ushort,
    resid: libc::c_int,
    duration: libc::c_uint,
    info: libc::c_uint,
}

/// Standard INQUIRY identity fields.
#[derive(Debug, Clone)]
pub struct ScsiInquiry {
    pub vendor: String,
    pub product: String,
    pub revision: String,
}

/// An open SCSI block device.
#[derive(Debug)]
pub struct ScsiHandle {
    file: File,
    path: String,
}

impl ScsiHandle {
    /// Open a SCSI block device node.
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

    /// Issue a standard INQUIRY and decode the identity strings.
    pub fn inquiry(&self) -> Result<ScsiInquiry> {
        let mut data = [0u8; INQUIRY_REPLY_LEN];
        let mut sense = [0u8; SENSE_LEN];
        let mut cdb: [u8; 6] = [INQUIRY, 0, 0, 0, INQUIRY_REPLY_LEN as u8, 0];

        let mut hdr: SgIoHdr = unsafe { std::mem::zeroed() };
        hdr.interface_id = libc::c_int::from(b'S');
        hdr.dxfer_direction = SG_DXFER_FROM_DEV;
        hdr.cmd_len = cdb.len() as libc::c_uchar;
        hdr.mx_sb_len = SENSE_LEN as libc::c_uchar;
        hdr.dxfer_len = INQUIRY_REPLY_LEN as libc::c_uint;
        hdr.dxferp = data.as_mut_ptr().cast();
        hdr.cmdp = cdb.as_mut_ptr();
        hdr.sbp = sense.as_mut_ptr();
        hdr.timeout = 5_000;

        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), SG_IO, &mut hdr) };
        if rc != 0 {
            return Err(Error::Ioctl {
                op: "scsi inquiry",
                device: self.path.clone(),
                source: nix::errno::Errno::last(),
            });
        }
        if hdr.status != 0 {
            return Err(Error::decode(
                "scsi inquiry",
                format!("command completed with status {:#04x}", hdr.status),
            ));
        }

        Ok(ScsiInquiry {
            vendor: inquiry_string(&data[8..16]),
            product: inquiry_string(&data[16..32]),
            revision: inquiry_string(&data[32..36]),
        })
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

fn inquiry_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inquiry_string_trims_padding() {
        assert_eq!(inquiry_string(b"ATA     "), "ATA");
        assert_eq!(inquiry_string(b"  HGST  "), "HGST");
    }
}
