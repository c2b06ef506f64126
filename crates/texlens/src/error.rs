use std::path::PathBuf;

use crate::format::PixelFormat;

/// Failures surfaced by the image engine.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// Load was called without a file name.
    #[error("no file name supplied")]
    EmptyInput,

    /// The container bytes are corrupt or of an unrecognised kind.
    #[error("failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    /// The pixel format has no GPU upload mapping.
    #[error("pixel format {0} has no GPU upload mapping")]
    UnsupportedFormat(PixelFormat),

    /// Handle allocation, storage definition, upload or readback failed.
    #[error("GPU resource error: {0}")]
    GpuResource(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ImageError {
    pub(crate) fn decode(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn gpu(reason: impl Into<String>) -> Self {
        Self::GpuResource(reason.into())
    }

    /// True when the failure came from the decoders rather than the GPU side.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::Io { .. })
    }
}

pub type Result<T, E = ImageError> = std::result::Result<T, E>;
