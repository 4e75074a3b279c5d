//! Blend modes and fill policies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::frame::CHANNELS;

/// Error returned when parsing a blend mode or fill policy from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind} '{value}'. Expected one of: {expected}")]
pub struct ParseOptionError {
    pub kind: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Per-pixel rule used to merge aligned frames into one image.
///
/// Every mode is applied independently to each channel, and every mode is
/// associative and commutative, so frame order never changes the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    /// Rounded mean of all frames.
    #[default]
    Average,
    /// Sum of all frames, saturated at 255 after the last frame.
    Additive,
    /// Brightest value seen.
    Max,
    /// Darkest value seen.
    Min,
}

impl BlendMode {
    pub const ALL: [BlendMode; 4] = [
        BlendMode::Average,
        BlendMode::Additive,
        BlendMode::Max,
        BlendMode::Min,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BlendMode::Average => "average",
            BlendMode::Additive => "additive",
            BlendMode::Max => "max",
            BlendMode::Min => "min",
        }
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlendMode {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "average" | "mean" => Ok(BlendMode::Average),
            "additive" | "add" => Ok(BlendMode::Additive),
            "max" | "lighten" => Ok(BlendMode::Max),
            "min" | "darken" => Ok(BlendMode::Min),
            _ => Err(ParseOptionError {
                kind: "blend mode",
                value: s.to_string(),
                expected: "average, additive, max, min",
            }),
        }
    }
}

/// Value assigned to output pixels that map outside the source frame.
///
/// Serialized as text: `edge-clamp`, `transparent`, or `solid:RRGGBB[AA]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FillPolicy {
    /// Repeat the nearest edge pixel of the source.
    #[default]
    EdgeClamp,
    /// All channels zero.
    Transparent,
    /// A fixed pixel value.
    Solid([u8; CHANNELS]),
}

impl FillPolicy {
    /// Opaque black (`solid:000000ff`).
    pub const BLACK: FillPolicy = FillPolicy::Solid([0, 0, 0, 255]);

    /// The constant fill pixel, or `None` when the policy samples the source.
    pub fn constant(&self) -> Option<[u8; CHANNELS]> {
        match self {
            FillPolicy::EdgeClamp => None,
            FillPolicy::Transparent => Some([0; CHANNELS]),
            FillPolicy::Solid(color) => Some(*color),
        }
    }
}

impl fmt::Display for FillPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillPolicy::EdgeClamp => f.write_str("edge-clamp"),
            FillPolicy::Transparent => f.write_str("transparent"),
            FillPolicy::Solid([r, g, b, a]) => write!(f, "solid:{r:02x}{g:02x}{b:02x}{a:02x}"),
        }
    }
}

impl FromStr for FillPolicy {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseOptionError {
            kind: "fill policy",
            value: s.to_string(),
            expected: "edge-clamp, transparent, black, solid:RRGGBB, solid:RRGGBBAA",
        };

        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "edge-clamp" | "clamp" => return Ok(FillPolicy::EdgeClamp),
            "transparent" => return Ok(FillPolicy::Transparent),
            "black" => return Ok(FillPolicy::BLACK),
            _ => {}
        }

        let hex = lower
            .strip_prefix("solid:")
            .map(|h| h.trim_start_matches('#'))
            .ok_or_else(err)?;
        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return Err(err());
        }

        let mut color = [0, 0, 0, 255];
        for (i, slot) in color.iter_mut().enumerate().take(hex.len() / 2) {
            *slot = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| err())?;
        }
        Ok(FillPolicy::Solid(color))
    }
}

impl TryFrom<String> for FillPolicy {
    type Error = ParseOptionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FillPolicy> for String {
    fn from(value: FillPolicy) -> Self {
        value.to_string()
    }
}
