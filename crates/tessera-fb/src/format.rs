use bitflags::bitflags;
use std::fmt;
use std::str::FromStr;

use crate::error::FrameBufferError;

/// Storage format of the displayable color buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorFormat {
    /// No color buffer is allocated.
    None,
    /// One packed `u32` per pixel, bytes in R, G, B, A order.
    Rgba8,
    /// Four `f32` components per pixel.
    Rgba32f,
}

impl ColorFormat {
    const RAW_NONE: u32 = 0;
    const RAW_RGBA8: u32 = 1;
    const RAW_SRGBA: u32 = 2;
    const RAW_RGBA32F: u32 = 3;

    pub fn as_raw(self) -> u32 {
        match self {
            ColorFormat::None => Self::RAW_NONE,
            ColorFormat::Rgba8 => Self::RAW_RGBA8,
            ColorFormat::Rgba32f => Self::RAW_RGBA32F,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ColorFormat::None => "none",
            ColorFormat::Rgba8 => "rgba8",
            ColorFormat::Rgba32f => "rgba32f",
        }
    }
}

impl TryFrom<u32> for ColorFormat {
    type Error = FrameBufferError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            Self::RAW_NONE => Ok(ColorFormat::None),
            Self::RAW_RGBA8 => Ok(ColorFormat::Rgba8),
            Self::RAW_RGBA32F => Ok(ColorFormat::Rgba32f),
            Self::RAW_SRGBA => Err(FrameBufferError::UnsupportedColorFormat(
                "srgba (2)".to_string(),
            )),
            other => Err(FrameBufferError::UnsupportedColorFormat(other.to_string())),
        }
    }
}

impl FromStr for ColorFormat {
    type Err = FrameBufferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(ColorFormat::None),
            "rgba8" => Ok(ColorFormat::Rgba8),
            "rgba32f" => Ok(ColorFormat::Rgba32f),
            other => Err(FrameBufferError::UnsupportedColorFormat(other.to_string())),
        }
    }
}

impl fmt::Display for ColorFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Frame buffer channels, used both to request buffers at construction and as
    /// the mask passed to `clear`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Channels: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const ACCUM = 1 << 2;
        const VARIANCE = 1 << 3;
        const NORMAL = 1 << 4;
        const ALBEDO = 1 << 5;
    }
}

/// Image size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("RGBA8".parse::<ColorFormat>().unwrap(), ColorFormat::Rgba8);
        assert_eq!(" rgba32f ".parse::<ColorFormat>().unwrap(), ColorFormat::Rgba32f);
        assert_eq!("none".parse::<ColorFormat>().unwrap(), ColorFormat::None);
        assert!("rgb565".parse::<ColorFormat>().is_err());
    }

    #[test]
    fn raw_enumerants_round_trip_and_reject_srgba() {
        for format in [ColorFormat::None, ColorFormat::Rgba8, ColorFormat::Rgba32f] {
            assert_eq!(ColorFormat::try_from(format.as_raw()).unwrap(), format);
        }
        assert!(matches!(
            ColorFormat::try_from(2),
            Err(FrameBufferError::UnsupportedColorFormat(_))
        ));
        assert!(ColorFormat::try_from(17).is_err());
    }
}
