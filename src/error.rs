// One error type for the whole pipeline.
// Every variant states *where* things went wrong.
use thiserror::Error;

use crate::types::ShapeType;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid options or malformed shape geometry.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A shape was rendered whose type has no registry entry.
    #[error("no brush registered for shape type {0:?}")]
    UnregisteredShapeType(ShapeType),

    /// Surfaces must be at least 1x1.
    #[error("invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// The heatmap was destroyed; the instance can no longer be used.
    #[error("heatmap used after destroy")]
    UseAfterDestroy,

    /// Reading an options file failed.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Reading an options file or writing a snapshot failed at the OS level.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Creating or updating the display window failed.
    #[error("window error: {0}")]
    Window(String),

    /// Encoding or writing a snapshot failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Device setup or readback failed in the GPU backend.
    #[error("gpu error: {0}")]
    Gpu(String),
}

pub type Result<T> = std::result::Result<T, Error>;
