//! Coarse aspect-ratio classification of a video stream.

use serde::{Deserialize, Serialize};
use std::fmt;

const LANDSCAPE_RATIO: f64 = 1.778;
const PORTRAIT_RATIO: f64 = 0.5625;
const RATIO_TOLERANCE: f64 = 0.01;

/// Aspect category of a probed video. Also the storage key prefix.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AspectCategory {
    /// 16:9 within tolerance.
    Landscape,
    /// 9:16 within tolerance.
    Portrait,
    Other,
}

impl AspectCategory {
    pub const ALL: [AspectCategory; 3] = [Self::Landscape, Self::Portrait, Self::Other];

    /// Classify `width / height` into a category.
    ///
    /// Encoded dimensions rarely hit the exact ratio (1920x1088 and friends),
    /// so each category matches a band of `±0.01` around its target.
    pub fn classify(width: u32, height: u32) -> Self {
        if height == 0 {
            return Self::Other;
        }

        let ratio = f64::from(width) / f64::from(height);
        if (ratio - LANDSCAPE_RATIO).abs() < RATIO_TOLERANCE {
            Self::Landscape
        } else if (ratio - PORTRAIT_RATIO).abs() < RATIO_TOLERANCE {
            Self::Portrait
        } else {
            Self::Other
        }
    }

    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Landscape => "landscape",
            Self::Portrait => "portrait",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for AspectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}
