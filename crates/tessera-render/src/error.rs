use tessera_fb::FrameBufferError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    FrameBuffer(#[from] FrameBufferError),

    /// Scene file written for another format revision.
    #[error("unsupported scene version {found} (expected {expected})")]
    SceneVersion { found: u32, expected: u32 },

    #[error("sphere {sphere} uses material {material}, but the scene defines {count}")]
    MaterialOutOfRange {
        sphere: usize,
        material: u32,
        count: usize,
    },

    #[error("sphere {sphere} has invalid radius {radius}")]
    InvalidRadius { sphere: usize, radius: f32 },

    #[error("frame buffer has no color buffer to export")]
    NoColor,

    #[error("color buffer does not match a {width}x{height} image")]
    ImageSize { width: u32, height: u32 },

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, RenderError>;
