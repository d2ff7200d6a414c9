//! Frame sources for screen sync.
//!
//! A [`FrameSource`] hands out packed `rgb24` frames for a monitor index.
//! [`RawVideoSource`] reads fixed-size frames from any byte stream, e.g. the
//! output of `ffmpeg -f x11grab ... -f rawvideo -pix_fmt rgb24 -`.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::color::Color;

// ── Error type ──

#[derive(Debug)]
pub enum CaptureError {
    /// Monitor index outside the source's range.
    NoSuchMonitor(usize),
    /// Underlying stream failed or ended.
    Io(std::io::Error),
    /// Pixel buffer length does not match `width * height * 3`.
    BadFrameSize { expected: usize, got: usize },
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::NoSuchMonitor(i) => write!(f, "No such monitor: {i}"),
            CaptureError::Io(e) => write!(f, "Capture failed: {e}"),
            CaptureError::BadFrameSize { expected, got } => {
                write!(f, "Bad frame size: expected {expected} bytes, got {got}")
            }
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CaptureError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(e: std::io::Error) -> Self {
        CaptureError::Io(e)
    }
}

// ── Frame ──

/// One packed `rgb24` image, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl Frame {
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Result<Self, CaptureError> {
        let expected = width * height * 3;
        if data.len() != expected {
            return Err(CaptureError::BadFrameSize {
                expected,
                got: data.len(),
            });
        }
        Ok(Frame {
            width,
            height,
            data,
        })
    }

    /// A frame filled with one color.
    pub fn solid(width: usize, height: usize, color: Color) -> Self {
        let data = [color.r, color.g, color.b].repeat(width * height);
        Frame {
            width,
            height,
            data,
        }
    }

    /// Build a frame pixel by pixel.
    pub fn from_fn(width: usize, height: usize, f: impl Fn(usize, usize) -> Color) -> Self {
        let mut data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                let c = f(x, y);
                data.extend_from_slice(&[c.r, c.g, c.b]);
            }
        }
        Frame {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width + x) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Keep every `step`-th pixel in both axes, starting at (0, 0).
    pub fn downscale(&self, step: usize) -> Frame {
        let step = step.max(1);
        if step == 1 {
            return self.clone();
        }
        let width = self.width.div_ceil(step);
        let height = self.height.div_ceil(step);
        let mut data = Vec::with_capacity(width * height * 3);
        for y in (0..self.height).step_by(step) {
            for x in (0..self.width).step_by(step) {
                data.extend_from_slice(&self.pixel(x, y));
            }
        }
        Frame {
            width,
            height,
            data,
        }
    }
}

// ── Sources ──

/// A capturable display region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Monitor {
    /// 1-based index.
    pub index: usize,
    pub width: usize,
    pub height: usize,
}

/// Anything that can produce frames for a monitor index.
///
/// `grab` may block; callers run it off the async executor.
pub trait FrameSource: Send + Sync {
    fn monitors(&self) -> Vec<Monitor>;

    fn grab(&self, monitor: usize) -> Result<Frame, CaptureError>;

    fn has_monitor(&self, index: usize) -> bool {
        self.monitors().iter().any(|m| m.index == index)
    }
}

/// Fixed-size `rgb24` frames read back-to-back from a byte stream.
///
/// Exposes a single monitor with index 1.
pub struct RawVideoSource {
    width: usize,
    height: usize,
    reader: Mutex<Box<dyn Read + Send>>,
}

impl fmt::Debug for RawVideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawVideoSource")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl RawVideoSource {
    pub fn new(reader: impl Read + Send + 'static, width: usize, height: usize) -> Self {
        RawVideoSource {
            width,
            height,
            reader: Mutex::new(Box::new(reader)),
        }
    }

    /// Open a file or FIFO; `-` reads standard input.
    pub fn open(path: &Path, width: usize, height: usize) -> std::io::Result<Self> {
        if path.as_os_str() == "-" {
            return Ok(Self::new(std::io::stdin(), width, height));
        }
        Ok(Self::new(File::open(path)?, width, height))
    }

    fn frame_len(&self) -> usize {
        self.width * self.height * 3
    }
}

impl FrameSource for RawVideoSource {
    fn monitors(&self) -> Vec<Monitor> {
        vec![Monitor {
            index: 1,
            width: self.width,
            height: self.height,
        }]
    }

    fn grab(&self, monitor: usize) -> Result<Frame, CaptureError> {
        if monitor != 1 {
            return Err(CaptureError::NoSuchMonitor(monitor));
        }
        let mut data = vec![0u8; self.frame_len()];
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        reader.read_exact(&mut data)?;
        Frame::new(self.width, self.height, data)
    }
}

// ── Mock source for testing ──

/// Scripted frame sources for unit and integration tests.
#[doc(hidden)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Plays back a list of frames, then either repeats the last one or
    /// fails with `UnexpectedEof`.
    pub struct MockSource {
        frames: Mutex<VecDeque<Frame>>,
        last: Mutex<Option<Frame>>,
        repeat_last: bool,
        monitor_count: usize,
        grabs: AtomicUsize,
    }

    impl MockSource {
        /// Repeats the final frame forever once the list is used up.
        pub fn looping(frames: Vec<Frame>) -> Self {
            Self::build(frames, true)
        }

        /// Errors once the list is used up.
        pub fn finite(frames: Vec<Frame>) -> Self {
            Self::build(frames, false)
        }

        fn build(frames: Vec<Frame>, repeat_last: bool) -> Self {
            MockSource {
                frames: Mutex::new(frames.into()),
                last: Mutex::new(None),
                repeat_last,
                monitor_count: 1,
                grabs: AtomicUsize::new(0),
            }
        }

        pub fn with_monitors(mut self, count: usize) -> Self {
            self.monitor_count = count;
            self
        }

        pub fn grab_count(&self) -> usize {
            self.grabs.load(Ordering::SeqCst)
        }
    }

    impl FrameSource for MockSource {
        fn monitors(&self) -> Vec<Monitor> {
            (1..=self.monitor_count)
                .map(|index| Monitor {
                    index,
                    width: 64,
                    height: 36,
                })
                .collect()
        }

        fn grab(&self, monitor: usize) -> Result<Frame, CaptureError> {
            if !self.has_monitor(monitor) {
                return Err(CaptureError::NoSuchMonitor(monitor));
            }
            self.grabs.fetch_add(1, Ordering::SeqCst);
            let next = self.frames.lock().unwrap().pop_front();
            let mut last = self.last.lock().unwrap();
            if let Some(frame) = next {
                *last = Some(frame.clone());
                return Ok(frame);
            }
            match last.as_ref() {
                Some(frame) if self.repeat_last => Ok(frame.clone()),
                _ => Err(CaptureError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "mock: out of frames",
                ))),
            }
        }
    }
}
