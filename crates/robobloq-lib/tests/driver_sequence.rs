//! Integration tests: driver hand-offs and wire output through the public API.
//!
//! These tests exercise discovery → controller → scheduler → control surface,
//! verifying that reports stay well-formed and that the sequence counter
//! advances once per write across mode switches.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use robobloq_lib::capture::Frame;
use robobloq_lib::capture::mock::MockSource;
use robobloq_lib::color::Color;
use robobloq_lib::context::{DriveContext, Mode};
use robobloq_lib::control::{ControlSurface, Defaults};
use robobloq_lib::device::mock::{MockTransport, mock_controller};
use robobloq_lib::device::{self, Controller};
use robobloq_lib::protocol::{self, *};
use robobloq_lib::scheduler::Scheduler;
use robobloq_lib::sync::SyncSettings;

/// Helper: fake `/dev` + `/sys/class/hidraw` with one vendor node.
fn fake_tree(root: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let dev = root.join("dev");
    let sys = root.join("sys");
    for (name, desc) in [
        ("hidraw0", &[0x05u8, 0x01, 0x09][..]),
        ("hidraw1", &VENDOR_SIGNATURE[..]),
    ] {
        std::fs::create_dir_all(&dev).unwrap();
        std::fs::write(dev.join(name), b"").unwrap();
        let d = sys.join(name).join("device");
        std::fs::create_dir_all(&d).unwrap();
        std::fs::write(d.join("report_descriptor"), desc).unwrap();
    }
    (dev, sys)
}

fn assert_well_formed(report: &[u8]) {
    assert_eq!(report.len(), REPORT_SIZE);
    assert_eq!(report[OFF_CHECKSUM], checksum(report));
    for (i, (&got, &want)) in report.iter().zip(REPORT_TEMPLATE.iter()).enumerate() {
        if matches!(i, OFF_COUNTER | OFF_RED | OFF_GREEN | OFF_BLUE | OFF_CHECKSUM) {
            continue;
        }
        assert_eq!(got, want, "byte {i}");
    }
}

// ── Test: discovered node receives a real report ──

#[tokio::test]
async fn discover_then_set_writes_report_to_node() {
    let root = tempfile::tempdir().unwrap();
    let (dev, sys) = fake_tree(root.path());

    let node = device::find_vendor_device_in(&dev, &sys).unwrap();
    assert_eq!(node, dev.join("hidraw1"));

    let scheduler = Scheduler::new(DriveContext::new(Controller::open(&node), Color::BLACK));
    scheduler.set_color(Color::new(10, 20, 30), 100).await.unwrap();

    let written = std::fs::read(&node).unwrap();
    assert_well_formed(&written);
    assert_eq!(written[OFF_COUNTER], INITIAL_COUNTER);
    assert_eq!(&written[OFF_RED..=OFF_BLUE], &[10, 20, 30]);
}

// ── Test: counter is continuous across hand-offs ──

#[tokio::test]
async fn counter_continuous_across_mode_switches() {
    let (ctl, t) = mock_controller();
    let scheduler = Scheduler::new(DriveContext::new(ctl, Color::BLACK));

    scheduler.set_color(Color::WHITE, 100).await.unwrap();
    scheduler.start_effect("rainbow", 100, None, 100).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    scheduler.fade(Color::new(0, 0, 255), 100, 0, 8).await;
    scheduler.wait().await;
    scheduler.off().await.unwrap();

    let reports = t.reports();
    assert!(reports.len() > 10);
    for (i, r) in reports.iter().enumerate() {
        assert_well_formed(r);
        assert_eq!(r[OFF_COUNTER], INITIAL_COUNTER.wrapping_add(i as u8), "write {i}");
    }
    assert_eq!(*t.colors().last().unwrap(), Color::BLACK);
}

// ── Test: fallback transport keeps the stream going ──

#[tokio::test]
async fn fallback_mid_fade_keeps_every_step() {
    let primary = MockTransport::new("raw write");
    let fallback = MockTransport::new("feature report");
    let ctl = Controller::with_transports(
        "mock://hidraw0",
        vec![Box::new(primary.clone()), Box::new(fallback.clone())],
    );
    let scheduler = Scheduler::new(DriveContext::new(ctl, Color::BLACK));

    primary.set_failing(true);
    scheduler.fade(Color::new(200, 0, 0), 100, 0, 10).await;
    scheduler.wait().await;

    assert_eq!(primary.write_count(), 0);
    assert_eq!(fallback.write_count(), 10);
    assert_eq!(*fallback.colors().last().unwrap(), Color::new(200, 0, 0));
    assert_eq!(scheduler.status().mode, Mode::Idle);
    assert!(scheduler.status().last_error.is_none());
}

// ── Test: one driver at a time through the control surface ──

#[tokio::test]
async fn control_script_hands_off_cleanly() {
    let (ctl, t) = mock_controller();
    let source = Arc::new(MockSource::looping(vec![Frame::solid(
        32,
        32,
        Color::new(0, 90, 200),
    )]));
    let scheduler = Scheduler::new(DriveContext::new(ctl, Color::WARM_WHITE))
        .with_frame_source(source);
    let cs = ControlSurface::new(
        scheduler,
        Defaults {
            sync: SyncSettings {
                fps: 100,
                ..Default::default()
            },
            ..Defaults::default()
        },
    );

    let script = concat!(
        r#"{"op":"effect","name":"pulse","speed":100}"#,
        "\n",
        r#"{"op":"sync"}"#,
        "\n",
        r#"{"op":"status"}"#,
        "\n",
    );
    let mut out = Vec::new();
    cs.serve(script.as_bytes(), &mut out).await.unwrap();

    let responses: Vec<serde_json::Value> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(responses.len(), 3);
    assert!(responses.iter().all(|r| r["ok"] == true));
    assert_eq!(responses[2]["mode"], "sync");

    tokio::time::sleep(Duration::from_millis(200)).await;
    let resp = cs.handle_line(r#"{"op":"stop"}"#).await;
    assert!(resp.ok);

    let n = t.write_count();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(t.write_count(), n, "nothing writes after stop");
    assert_eq!(cs.scheduler().status().mode, Mode::Idle);
}

// ── Test: protocol encode matches controller output ──

#[test]
fn controller_reports_match_encoder() {
    let (mut ctl, t) = mock_controller();
    let colors = [Color::new(1, 2, 3), Color::WHITE, Color::BLACK];
    for c in colors {
        ctl.set_color(c).unwrap();
    }
    let reports = t.reports();
    for (i, c) in colors.iter().enumerate() {
        let expected = protocol::encode(INITIAL_COUNTER + i as u8, *c).unwrap();
        assert_eq!(reports[i], expected);
    }
}
