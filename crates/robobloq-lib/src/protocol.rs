//! Protocol constants and report encoding for Robobloq USB LED bars.
//!
//! All values decoded from USB captures of the vendor software.
//!
//! ## Report layout
//!
//! Every color change is one 64-byte HID report. The bar accepts a single
//! solid color per report; there is no per-LED addressing.
//!
//! | Offset | Meaning                                   |
//! |--------|-------------------------------------------|
//! | 3      | sequence counter (wraps mod 256)          |
//! | 6      | red                                       |
//! | 7      | green                                     |
//! | 8      | blue                                      |
//! | 15     | checksum: `sum(bytes[0..15]) mod 256`     |
//!
//! All other bytes are copied verbatim from a known-good captured report.
//! A frame with a wrong checksum is silently ignored by the firmware.

use crate::color::Color;
use crate::device::{DeviceError, Result};

// ── Report framing ──

/// Size of every report sent to the device.
pub const REPORT_SIZE: usize = 64;

/// A complete, ready-to-send report.
pub type Report = [u8; REPORT_SIZE];

/// Offset of the rolling sequence counter.
pub const OFF_COUNTER: usize = 3;

/// Offset of the red channel.
pub const OFF_RED: usize = 6;

/// Offset of the green channel.
pub const OFF_GREEN: usize = 7;

/// Offset of the blue channel.
pub const OFF_BLUE: usize = 8;

/// Offset of the additive checksum byte.
pub const OFF_CHECKSUM: usize = 15;

/// Number of leading bytes covered by the checksum.
pub const CHECKSUM_SPAN: usize = 15;

/// Captured "solid blue" report (counter 0x0E, rgb 00/00/FF).
///
/// Only the counter, color and checksum bytes are rewritten per frame.
pub const REPORT_TEMPLATE: Report = [
    0x52, 0x42, 0x10, 0x0E, 0x86, 0x01, 0x00, 0x00, //
    0xFF, 0x41, 0x42, 0x00, 0x00, 0x00, 0xFE, 0xB9, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
];

/// Counter value of the captured template; the controller starts here.
pub const INITIAL_COUNTER: u8 = 0x0E;

// ── Device identification ──

/// First three bytes of the vendor interface's report descriptor:
/// `06 00 FF` = Usage Page (Vendor Defined 0xFF00).
pub const VENDOR_SIGNATURE: [u8; 3] = [0x06, 0x00, 0xFF];

/// Directory holding the hidraw character devices.
pub const HIDRAW_DEV_DIR: &str = "/dev";

/// Sysfs class directory exposing per-node report descriptors.
pub const HIDRAW_SYSFS_DIR: &str = "/sys/class/hidraw";

/// Name prefix of hidraw device nodes.
pub const HIDRAW_PREFIX: &str = "hidraw";

// ── ioctl ──

const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;
const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = 8;
const IOC_SIZESHIFT: u32 = 16;
const IOC_DIRSHIFT: u32 = 30;

/// `HIDIOCSFEATURE(len)`: set a feature report on a hidraw node.
///
/// Same encoding as the kernel's `_IOC(_IOC_WRITE|_IOC_READ, 'H', 0x06, len)`.
pub const fn hidiocsfeature(len: usize) -> u32 {
    ((IOC_WRITE | IOC_READ) << IOC_DIRSHIFT)
        | ((b'H' as u32) << IOC_TYPESHIFT)
        | (0x06 << IOC_NRSHIFT)
        | ((len as u32) << IOC_SIZESHIFT)
}

// ── Encoding ──

/// Additive checksum over the first [`CHECKSUM_SPAN`] bytes.
pub fn checksum(report: &[u8]) -> u8 {
    report[..CHECKSUM_SPAN]
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Build a report from an arbitrary template.
///
/// Fails with [`DeviceError::Protocol`] if the template is not exactly
/// [`REPORT_SIZE`] bytes.
pub fn encode_with_template(template: &[u8], counter: u8, color: Color) -> Result<Report> {
    let mut report: Report = template.try_into().map_err(|_| {
        DeviceError::Protocol(format!(
            "report template must be {REPORT_SIZE} bytes, got {}",
            template.len()
        ))
    })?;

    report[OFF_COUNTER] = counter;
    report[OFF_RED] = color.r;
    report[OFF_GREEN] = color.g;
    report[OFF_BLUE] = color.b;
    report[OFF_CHECKSUM] = checksum(&report);

    Ok(report)
}

/// Build a report from the packaged template.
pub fn encode(counter: u8, color: Color) -> Result<Report> {
    encode_with_template(&REPORT_TEMPLATE, counter, color)
}
