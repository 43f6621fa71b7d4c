//! Video resolution parsing and naming.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named 16:9 resolutions.
const WIDESCREEN_RESOLUTIONS: &[(u32, u32, &str)] = &[
    (3840, 2160, "2160p"),
    (2560, 1440, "1440p"),
    (1920, 1080, "1080p"),
    (1280, 720, "720p"),
    (1024, 576, "576p"),
    (853, 480, "480p"),
];

/// Named 4:3 resolutions.
const STANDARD_RESOLUTIONS: &[(u32, u32, &str)] = &[(720, 576, "576p"), (720, 480, "480p")];

/// Width and height of a video stream in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Parses the `WIDTHxHEIGHT` form used by the metadata service.
    /// Zero dimensions are treated as unknown.
    pub fn parse(s: &str) -> Option<Self> {
        let (width, height) = s.trim().split_once(['x', 'X'])?;
        let width: u32 = width.trim().parse().ok()?;
        let height: u32 = height.trim().parse().ok()?;
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self { width, height })
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Resolves a named resolution such as `1080p`.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        WIDESCREEN_RESOLUTIONS
            .iter()
            .find(|(_, _, name)| *name == label)
            .map(|(w, h, _)| Self::new(*w, *h))
    }

    /// Name of the closest known resolution. Exact matches win, otherwise the
    /// entry with the nearest pixel area is used.
    pub fn label(&self) -> &'static str {
        let known = WIDESCREEN_RESOLUTIONS
            .iter()
            .chain(STANDARD_RESOLUTIONS.iter());

        if let Some((_, _, name)) = known
            .clone()
            .find(|(w, h, _)| *w == self.width && *h == self.height)
        {
            return name;
        }

        let area = self.area() as i64;
        known
            .min_by_key(|(w, h, _)| ((*w as i64 * *h as i64) - area).abs())
            .map(|(_, _, name)| *name)
            .unwrap_or("unknown")
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
