use thiserror::Error;

/// Capability or input stream not found
pub const ERR_NOT_FOUND: i32 = -1;
/// Codec context / frame / packet allocation failed
pub const ERR_ALLOC: i32 = -2;
/// Quality outside 1..=31
pub const ERR_INVALID_QUALITY: i32 = -3;
/// File I/O failed or transferred a partial frame
pub const ERR_IO: i32 = -5;
/// AVERROR(ENOMEM): caller buffer too small
pub const ERR_NO_MEMORY: i32 = -12;
/// AVERROR(EINVAL)
pub const ERR_INVALID_PARAMETER: i32 = -22;
/// Backend not compiled into this build
pub const ERR_UNAVAILABLE: i32 = -38;
/// AVERROR_EXTERNAL: failure inside libjpeg-turbo
pub const ERR_EXTERNAL: i32 = -542_398_533;

/// Codec error type
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid quality {0} (must be 1-31)")]
    InvalidQuality(i32),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Allocation failed: {0}")]
    AllocFailed(String),

    #[error("Output buffer too small: {required} bytes required")]
    BufferTooSmall { required: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Incomplete frame transfer: expected {expected} bytes, got {actual} bytes")]
    ShortTransfer { expected: usize, actual: usize },

    #[error("Codec error {code}: {message}")]
    Codec { code: i32, message: String },
}

impl CodecError {
    /// Negative integer code reported through the C API
    pub fn code(&self) -> i32 {
        match self {
            CodecError::InvalidParameter(_) => ERR_INVALID_PARAMETER,
            CodecError::InvalidQuality(_) => ERR_INVALID_QUALITY,
            CodecError::NotFound(_) => ERR_NOT_FOUND,
            CodecError::Unavailable(_) => ERR_UNAVAILABLE,
            CodecError::AllocFailed(_) => ERR_ALLOC,
            CodecError::BufferTooSmall { .. } => ERR_NO_MEMORY,
            CodecError::Io(_) | CodecError::ShortTransfer { .. } => ERR_IO,
            // Opaque codes from the wrapped library pass through; anything
            // non-negative would read as success, so clamp it.
            CodecError::Codec { code, .. } if *code < 0 => *code,
            CodecError::Codec { .. } => ERR_INVALID_PARAMETER,
        }
    }

    pub fn codec(code: i32, message: impl Into<String>) -> Self {
        CodecError::Codec {
            code,
            message: message.into(),
        }
    }
}

#[cfg(feature = "rkmpp")]
impl From<ffmpeg_next::Error> for CodecError {
    fn from(err: ffmpeg_next::Error) -> Self {
        let message = err.to_string();
        CodecError::Codec {
            code: i32::from(err),
            message,
        }
    }
}

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_negative() {
        let errors = [
            CodecError::InvalidParameter("x".into()),
            CodecError::InvalidQuality(0),
            CodecError::NotFound("mjpeg_rkmpp".into()),
            CodecError::Unavailable("rkmpp".into()),
            CodecError::AllocFailed("frame".into()),
            CodecError::BufferTooSmall { required: 10 },
            CodecError::ShortTransfer {
                expected: 10,
                actual: 3,
            },
            CodecError::codec(-1094995529, "Invalid data found when processing input"),
            CodecError::codec(7, "bogus"),
        ];
        for err in &errors {
            assert!(err.code() < 0, "{} -> {}", err, err.code());
        }
    }

    #[test]
    fn test_codec_code_passthrough() {
        assert_eq!(CodecError::codec(-11, "again").code(), -11);
        assert_eq!(CodecError::InvalidQuality(32).code(), ERR_INVALID_QUALITY);
        assert_eq!(
            CodecError::BufferTooSmall { required: 1 }.code(),
            ERR_NO_MEMORY
        );
    }
}
