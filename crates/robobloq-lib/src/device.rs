//! Device communication: hidraw discovery, transport strategies, controller.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::color::Color;
use crate::protocol::{self, HIDRAW_PREFIX, Report, VENDOR_SIGNATURE};

// ── Error type ──

/// Device communication errors.
///
/// String payloads follow the convention **"context: details"** where *context*
/// identifies the operation (e.g. `"read /dev"`) and *details* describes what
/// went wrong.
#[derive(Debug)]
pub enum DeviceError {
    /// No hidraw node exposes the vendor interface.
    NotFound,
    /// The device directory could not be listed.
    EnumerateFailed(String),
    /// The packaged report template is malformed.
    Protocol(String),
    /// Every transport strategy failed for one report.
    Transport(Vec<TransportFailure>),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NotFound => write!(
                f,
                "Vendor HID interface not found. Unplug/replug the LED and try again."
            ),
            DeviceError::EnumerateFailed(e) => write!(f, "Device enumeration failed: {e}"),
            DeviceError::Protocol(e) => write!(f, "Protocol error: {e}"),
            DeviceError::Transport(failures) if failures.is_empty() => {
                write!(f, "Write failed: no transports configured")
            }
            DeviceError::Transport(failures) => {
                let parts: Vec<String> = failures.iter().map(|tf| tf.to_string()).collect();
                write!(f, "Write failed: {}", parts.join("; "))
            }
        }
    }
}

impl std::error::Error for DeviceError {}

pub type Result<T> = std::result::Result<T, DeviceError>;

/// One failed attempt inside [`Controller::set_color`].
#[derive(Debug)]
pub struct TransportFailure {
    pub strategy: &'static str,
    pub error: std::io::Error,
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.error)
    }
}

// ── Transports ──

/// A way of getting one report onto the device node.
///
/// The controller tries its transports in order until one succeeds.
pub trait Transport: Send {
    /// Short label used in logs and in [`Delivery::strategy`].
    fn name(&self) -> &'static str;
    fn send(&self, path: &Path, report: &Report) -> std::io::Result<()>;
}

/// Plain `write(2)` of the report to the hidraw node (output report).
#[derive(Debug, Default, Clone, Copy)]
pub struct RawWrite;

impl Transport for RawWrite {
    fn name(&self) -> &'static str {
        "raw write"
    }

    fn send(&self, path: &Path, report: &Report) -> std::io::Result<()> {
        let mut file = OpenOptions::new().write(true).open(path)?;
        file.write_all(report)
    }
}

/// `HIDIOCSFEATURE` ioctl carrying the same 64 bytes (feature report).
#[derive(Debug, Default, Clone, Copy)]
pub struct FeatureReport;

impl Transport for FeatureReport {
    fn name(&self) -> &'static str {
        "feature report"
    }

    #[cfg(target_os = "linux")]
    fn send(&self, path: &Path, report: &Report) -> std::io::Result<()> {
        use std::os::fd::AsRawFd;

        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut buf = *report;
        // SAFETY: fd is open for the duration of the call and `buf` is exactly
        // the length encoded in the request number.
        let rc = unsafe {
            libc::ioctl(
                file.as_raw_fd(),
                protocol::hidiocsfeature(buf.len()) as _,
                buf.as_mut_ptr(),
            )
        };
        if rc < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn send(&self, _path: &Path, _report: &Report) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "feature reports need Linux hidraw",
        ))
    }
}

/// Default strategy order: raw write first, feature report as fallback.
pub fn default_transports() -> Vec<Box<dyn Transport>> {
    vec![Box::new(RawWrite), Box::new(FeatureReport)]
}

// ── Controller ──

/// Result of a successful [`Controller::set_color`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Name of the transport that accepted the report.
    pub strategy: &'static str,
    /// Counter value the report carried.
    pub counter: u8,
}

/// Owns the device path, the transport strategies and the sequence counter.
///
/// Holds no scheduling logic; callers serialize access.
pub struct Controller {
    path: PathBuf,
    transports: Vec<Box<dyn Transport>>,
    counter: u8,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.transports.iter().map(|t| t.name()).collect();
        f.debug_struct("Controller")
            .field("path", &self.path)
            .field("transports", &names)
            .field("counter", &self.counter)
            .finish()
    }
}

impl Controller {
    /// Controller for a known node with the default transports.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_transports(path, default_transports())
    }

    /// Controller with an explicit, ordered transport list.
    pub fn with_transports(path: impl Into<PathBuf>, transports: Vec<Box<dyn Transport>>) -> Self {
        Controller {
            path: path.into(),
            transports,
            counter: protocol::INITIAL_COUNTER,
        }
    }

    /// Locate the vendor interface and open it.
    pub fn discover() -> Result<Self> {
        Ok(Self::open(find_vendor_device()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Counter value the next report will carry.
    pub fn counter(&self) -> u8 {
        self.counter
    }

    /// Encode and send one solid color.
    ///
    /// The counter advances exactly once when any transport succeeds and
    /// stays put when all of them fail.
    pub fn set_color(&mut self, color: Color) -> Result<Delivery> {
        let report = protocol::encode(self.counter, color)?;
        let mut failures = Vec::new();

        for transport in &self.transports {
            match transport.send(&self.path, &report) {
                Ok(()) => {
                    if !failures.is_empty() {
                        log::debug!(
                            "{}: delivered via {} after {} failure(s)",
                            self.path.display(),
                            transport.name(),
                            failures.len()
                        );
                    }
                    let delivery = Delivery {
                        strategy: transport.name(),
                        counter: self.counter,
                    };
                    self.counter = self.counter.wrapping_add(1);
                    return Ok(delivery);
                }
                Err(e) => {
                    log::debug!("{}: {} failed: {e}", self.path.display(), transport.name());
                    failures.push(TransportFailure {
                        strategy: transport.name(),
                        error: e,
                    });
                }
            }
        }

        Err(DeviceError::Transport(failures))
    }
}

// ── Discovery ──

/// A hidraw node seen during enumeration.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredDevice {
    /// Device node path, e.g. `/dev/hidraw3`.
    pub path: String,
    /// Whether the report descriptor starts with [`VENDOR_SIGNATURE`].
    pub vendor_interface: bool,
    /// Hex of the first descriptor bytes, if the descriptor was readable.
    pub descriptor_prefix: Option<String>,
}

/// List `hidraw*` nodes in `dev_dir`, sorted lexically by file name.
pub fn hidraw_nodes(dev_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dev_dir)
        .map_err(|e| DeviceError::EnumerateFailed(format!("read {}: {e}", dev_dir.display())))?;

    let mut nodes: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(HIDRAW_PREFIX))
        .map(|entry| entry.path())
        .collect();
    nodes.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(nodes)
}

/// First three report-descriptor bytes of `node`, or `None` if absent/unreadable.
fn descriptor_prefix(sysfs_dir: &Path, node: &Path) -> Option<[u8; 3]> {
    let name = node.file_name()?;
    let desc_path = sysfs_dir.join(name).join("device").join("report_descriptor");
    let mut buf = [0u8; 3];
    File::open(&desc_path).ok()?.read_exact(&mut buf).ok()?;
    Some(buf)
}

/// Find the vendor interface among the nodes in `dev_dir`, using
/// descriptors under `sysfs_dir`.
///
/// Returns the lowest-sorted match; further matches are ignored.
pub fn find_vendor_device_in(dev_dir: &Path, sysfs_dir: &Path) -> Result<PathBuf> {
    for node in hidraw_nodes(dev_dir)? {
        match descriptor_prefix(sysfs_dir, &node) {
            Some(prefix) if prefix == VENDOR_SIGNATURE => {
                log::debug!("vendor interface at {}", node.display());
                return Ok(node);
            }
            Some(_) => {}
            None => log::debug!("{}: no readable report descriptor, skipped", node.display()),
        }
    }
    Err(DeviceError::NotFound)
}

/// Find the `/dev/hidrawN` node for the Robobloq vendor interface.
pub fn find_vendor_device() -> Result<PathBuf> {
    find_vendor_device_in(
        Path::new(protocol::HIDRAW_DEV_DIR),
        Path::new(protocol::HIDRAW_SYSFS_DIR),
    )
}

/// Enumerate every hidraw node under `dev_dir` with its match status.
pub fn enumerate_devices_in(dev_dir: &Path, sysfs_dir: &Path) -> Vec<DiscoveredDevice> {
    let Ok(nodes) = hidraw_nodes(dev_dir) else {
        return Vec::new();
    };
    nodes
        .into_iter()
        .map(|node| {
            let prefix = descriptor_prefix(sysfs_dir, &node);
            DiscoveredDevice {
                path: node.display().to_string(),
                vendor_interface: prefix == Some(VENDOR_SIGNATURE),
                descriptor_prefix: prefix.map(|p| {
                    p.iter()
                        .map(|b| format!("{b:02x}"))
                        .collect::<Vec<_>>()
                        .join(" ")
                }),
            }
        })
        .collect()
}

/// Enumerate every hidraw node on the system.
pub fn enumerate_devices() -> Vec<DiscoveredDevice> {
    enumerate_devices_in(
        Path::new(protocol::HIDRAW_DEV_DIR),
        Path::new(protocol::HIDRAW_SYSFS_DIR),
    )
}

/// Open the given node, or auto-discover when `path` is `None` or empty.
pub fn open_device(path: Option<&Path>) -> Result<Controller> {
    match path {
        Some(p) if !p.as_os_str().is_empty() => Ok(Controller::open(p)),
        _ => Controller::discover(),
    }
}

// ── Mock transport for testing ──

/// In-memory transports for unit and integration tests.
///
/// Always compiled (zero runtime cost), hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    /// Records every report it accepts. Clones share the same record, so a
    /// test keeps one handle while the controller owns another.
    #[derive(Clone)]
    pub struct MockTransport {
        name: &'static str,
        /// Accepted reports with the time they arrived.
        pub writes: Arc<Mutex<Vec<(Instant, Report)>>>,
        /// If true, `send` fails with `BrokenPipe`.
        pub fail: Arc<AtomicBool>,
    }

    impl MockTransport {
        pub fn new(name: &'static str) -> Self {
            MockTransport {
                name,
                writes: Arc::new(Mutex::new(Vec::new())),
                fail: Arc::new(AtomicBool::new(false)),
            }
        }

        pub fn failing(name: &'static str) -> Self {
            let t = Self::new(name);
            t.set_failing(true);
            t
        }

        pub fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        pub fn reports(&self) -> Vec<Report> {
            self.writes
                .lock()
                .unwrap()
                .iter()
                .map(|(_, r)| *r)
                .collect()
        }

        /// Colors decoded from the accepted reports, in order.
        pub fn colors(&self) -> Vec<Color> {
            self.reports()
                .iter()
                .map(|r| {
                    Color::new(
                        r[protocol::OFF_RED],
                        r[protocol::OFF_GREEN],
                        r[protocol::OFF_BLUE],
                    )
                })
                .collect()
        }

        pub fn write_count(&self) -> usize {
            self.writes.lock().unwrap().len()
        }
    }

    impl Transport for MockTransport {
        fn name(&self) -> &'static str {
            self.name
        }

        fn send(&self, _path: &Path, report: &Report) -> std::io::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    format!("mock: {} failure injected", self.name),
                ));
            }
            self.writes.lock().unwrap().push((Instant::now(), *report));
            Ok(())
        }
    }

    /// Controller backed by one recording transport.
    pub fn mock_controller() -> (Controller, MockTransport) {
        let t = MockTransport::new("mock");
        let ctl = Controller::with_transports("mock://hidraw0", vec![Box::new(t.clone())]);
        (ctl, t)
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockTransport;
    use super::*;

    fn fake_tree() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let dev = root.path().join("dev");
        let sys = root.path().join("sys");
        std::fs::create_dir_all(&dev).unwrap();
        std::fs::create_dir_all(&sys).unwrap();
        (root, dev, sys)
    }

    fn add_node(dev: &Path, sys: &Path, name: &str, descriptor: Option<&[u8]>) {
        std::fs::write(dev.join(name), b"").unwrap();
        if let Some(desc) = descriptor {
            let d = sys.join(name).join("device");
            std::fs::create_dir_all(&d).unwrap();
            std::fs::write(d.join("report_descriptor"), desc).unwrap();
        }
    }

    // ── Locator ──

    #[test]
    fn finds_vendor_node_among_others() {
        let (_root, dev, sys) = fake_tree();
        add_node(&dev, &sys, "hidraw0", Some(&[0x05, 0x01, 0x09, 0x06]));
        add_node(&dev, &sys, "hidraw1", Some(&[0x06, 0x00, 0xFF, 0x09, 0x01]));
        add_node(&dev, &sys, "hidraw2", Some(&[0x05, 0x0C]));

        let found = find_vendor_device_in(&dev, &sys).unwrap();
        assert_eq!(found, dev.join("hidraw1"));
    }

    #[test]
    fn lowest_sorted_match_wins() {
        let (_root, dev, sys) = fake_tree();
        add_node(&dev, &sys, "hidraw5", Some(&VENDOR_SIGNATURE));
        add_node(&dev, &sys, "hidraw3", Some(&VENDOR_SIGNATURE));

        let found = find_vendor_device_in(&dev, &sys).unwrap();
        assert_eq!(found, dev.join("hidraw3"));
    }

    #[test]
    fn ordering_is_lexical_not_numeric() {
        let (_root, dev, sys) = fake_tree();
        add_node(&dev, &sys, "hidraw2", Some(&VENDOR_SIGNATURE));
        add_node(&dev, &sys, "hidraw10", Some(&VENDOR_SIGNATURE));

        let found = find_vendor_device_in(&dev, &sys).unwrap();
        assert_eq!(found, dev.join("hidraw10"));
    }

    #[test]
    fn missing_descriptor_is_skipped() {
        let (_root, dev, sys) = fake_tree();
        add_node(&dev, &sys, "hidraw0", None);
        add_node(&dev, &sys, "hidraw1", Some(&VENDOR_SIGNATURE));

        let found = find_vendor_device_in(&dev, &sys).unwrap();
        assert_eq!(found, dev.join("hidraw1"));
    }

    #[test]
    fn short_descriptor_is_skipped() {
        let (_root, dev, sys) = fake_tree();
        add_node(&dev, &sys, "hidraw0", Some(&[0x06, 0x00]));

        assert!(matches!(
            find_vendor_device_in(&dev, &sys),
            Err(DeviceError::NotFound)
        ));
    }

    #[test]
    fn non_hidraw_entries_ignored() {
        let (_root, dev, sys) = fake_tree();
        add_node(&dev, &sys, "ttyUSB0", Some(&VENDOR_SIGNATURE));

        assert!(matches!(
            find_vendor_device_in(&dev, &sys),
            Err(DeviceError::NotFound)
        ));
    }

    #[test]
    fn missing_dev_dir_is_enumerate_error() {
        let (root, _dev, sys) = fake_tree();
        let err = find_vendor_device_in(&root.path().join("nope"), &sys).unwrap_err();
        assert!(matches!(err, DeviceError::EnumerateFailed(_)));
    }

    #[test]
    fn enumerate_reports_match_status() {
        let (_root, dev, sys) = fake_tree();
        add_node(&dev, &sys, "hidraw0", Some(&[0x05, 0x01, 0x09]));
        add_node(&dev, &sys, "hidraw1", Some(&VENDOR_SIGNATURE));
        add_node(&dev, &sys, "hidraw2", None);

        let found = enumerate_devices_in(&dev, &sys);
        assert_eq!(found.len(), 3);
        assert!(!found[0].vendor_interface);
        assert!(found[1].vendor_interface);
        assert_eq!(found[1].descriptor_prefix.as_deref(), Some("06 00 ff"));
        assert!(found[2].descriptor_prefix.is_none());
    }

    #[test]
    fn discovered_device_serializes() {
        let d = DiscoveredDevice {
            path: "/dev/hidraw1".into(),
            vendor_interface: true,
            descriptor_prefix: Some("06 00 ff".into()),
        };
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["path"], "/dev/hidraw1");
        assert_eq!(json["vendor_interface"], true);
    }

    #[test]
    fn not_found_message_asks_for_replug() {
        assert!(DeviceError::NotFound.to_string().contains("replug"));
    }

    // ── Controller ──

    #[test]
    fn counter_starts_at_template_value() {
        let (ctl, _) = mock::mock_controller();
        assert_eq!(ctl.counter(), protocol::INITIAL_COUNTER);
    }

    #[test]
    fn set_color_sends_encoded_report() {
        let (mut ctl, t) = mock::mock_controller();
        let delivery = ctl.set_color(Color::new(10, 20, 30)).unwrap();
        assert_eq!(delivery.strategy, "mock");
        assert_eq!(delivery.counter, 0x0E);

        let reports = t.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(
            reports[0],
            protocol::encode(0x0E, Color::new(10, 20, 30)).unwrap()
        );
    }

    #[test]
    fn counter_advances_once_per_call_and_wraps() {
        let (mut ctl, t) = mock::mock_controller();
        let start = ctl.counter();
        for _ in 0..300 {
            ctl.set_color(Color::WHITE).unwrap();
        }
        assert_eq!(ctl.counter(), start.wrapping_add((300 % 256) as u8));
        let reports = t.reports();
        assert_eq!(reports[241][protocol::OFF_COUNTER], 0xFF);
        assert_eq!(reports[242][protocol::OFF_COUNTER], 0x00);
    }

    #[test]
    fn falls_back_when_primary_fails() {
        let primary = MockTransport::failing("primary");
        let fallback = MockTransport::new("fallback");
        let mut ctl = Controller::with_transports(
            "mock://x",
            vec![Box::new(primary.clone()), Box::new(fallback.clone())],
        );

        let delivery = ctl.set_color(Color::new(1, 2, 3)).unwrap();
        assert_eq!(delivery.strategy, "fallback");
        assert_eq!(primary.write_count(), 0);
        assert_eq!(fallback.write_count(), 1);
        assert_eq!(ctl.counter(), 0x0F);
    }

    #[test]
    fn primary_success_skips_fallback() {
        let primary = MockTransport::new("primary");
        let fallback = MockTransport::new("fallback");
        let mut ctl = Controller::with_transports(
            "mock://x",
            vec![Box::new(primary.clone()), Box::new(fallback.clone())],
        );

        ctl.set_color(Color::BLACK).unwrap();
        assert_eq!(primary.write_count(), 1);
        assert_eq!(fallback.write_count(), 0);
    }

    #[test]
    fn counter_advances_by_n_across_mixed_paths() {
        let primary = MockTransport::new("primary");
        let fallback = MockTransport::new("fallback");
        let mut ctl = Controller::with_transports(
            "mock://x",
            vec![Box::new(primary.clone()), Box::new(fallback.clone())],
        );

        for i in 0..10 {
            primary.set_failing(i % 3 == 0);
            ctl.set_color(Color::WHITE).unwrap();
        }
        assert_eq!(ctl.counter(), 0x0E + 10);
        assert_eq!(primary.write_count() + fallback.write_count(), 10);
    }

    #[test]
    fn total_failure_keeps_counter_and_aggregates() {
        let mut ctl = Controller::with_transports(
            "mock://x",
            vec![
                Box::new(MockTransport::failing("primary")),
                Box::new(MockTransport::failing("fallback")),
            ],
        );

        let err = ctl.set_color(Color::WHITE).unwrap_err();
        match &err {
            DeviceError::Transport(failures) => {
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].strategy, "primary");
                assert_eq!(failures[1].strategy, "fallback");
            }
            other => panic!("expected Transport, got {other:?}"),
        }
        assert!(err.to_string().contains("primary"));
        assert_eq!(ctl.counter(), 0x0E);
    }

    #[test]
    fn raw_write_to_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let node = dir.path().join("hidraw9");
        std::fs::write(&node, b"").unwrap();

        let mut ctl = Controller::open(&node);
        let delivery = ctl.set_color(Color::new(0xAA, 0xBB, 0xCC)).unwrap();
        assert_eq!(delivery.strategy, "raw write");

        let written = std::fs::read(&node).unwrap();
        assert_eq!(written.len(), protocol::REPORT_SIZE);
        assert_eq!(&written[6..9], &[0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn missing_node_fails_every_transport() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = Controller::open(dir.path().join("hidraw-missing"));

        let err = ctl.set_color(Color::WHITE).unwrap_err();
        assert!(matches!(err, DeviceError::Transport(ref f) if f.len() == 2));
        assert_eq!(ctl.counter(), protocol::INITIAL_COUNTER);
    }

    #[test]
    fn open_device_prefers_explicit_path() {
        let ctl = open_device(Some(Path::new("/dev/hidraw7"))).unwrap();
        assert_eq!(ctl.path(), Path::new("/dev/hidraw7"));
    }
}
