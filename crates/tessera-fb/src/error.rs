use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameBufferError {
    /// Color format enumerant or name outside the supported set.
    #[error("color buffer format not supported: {0}")]
    UnsupportedColorFormat(String),

    #[error("frame buffer extent must be non-zero, got {width}x{height}")]
    EmptyExtent { width: u32, height: u32 },

    /// External color buffer does not match the requested image.
    #[error("external color buffer holds {actual} pixels, expected {expected}")]
    ExternalBufferSize { expected: usize, actual: usize },

    /// A mapping handed to `unmap` was produced by another frame buffer.
    #[error("mapping does not belong to this frame buffer")]
    ForeignMapping,
}

pub type Result<T> = std::result::Result<T, FrameBufferError>;
