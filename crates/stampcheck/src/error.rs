use std::path::PathBuf;

/// Errors loading or validating an [`InspectionConfig`](crate::InspectionConfig).
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {}", .issues.join("; "))]
    Invalid { issues: Vec<String> },
    #[error("environment variable {name}={value:?} is not a valid value")]
    EnvVar { name: &'static str, value: String },
}

/// Errors from the per-order [`Session`](crate::Session).
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("session for order {order} is closed")]
    Closed { order: String },
    #[error("invalid order number {order:?}: {reason}")]
    InvalidOrder { order: String, reason: &'static str },
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no free artifact path after {attempts} attempts (last tried {})", .last.display())]
    PathExhausted { attempts: usize, last: PathBuf },
    #[error(
        "order {order} is held by another session; remove {} if no process is using it",
        .path.display()
    )]
    Locked { order: String, path: PathBuf },
}

impl SessionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure of an [`ImageSource`](crate::ImageSource) to deliver a frame.
#[derive(thiserror::Error, Debug)]
pub enum AcquireError {
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors that abort one inspection.
#[derive(thiserror::Error, Debug)]
pub enum InspectError {
    #[error("failed to encode annotated image: {0}")]
    Encode(#[from] image::ImageError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("invalid image buffer (width={width}, height={height}, len={len})")]
    InvalidImage {
        width: usize,
        height: usize,
        len: usize,
    },
}

impl InspectError {
    /// Stable, machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            InspectError::Encode(_) => "encode",
            InspectError::Session(SessionError::Closed { .. }) => "session_closed",
            InspectError::Session(SessionError::InvalidOrder { .. }) => "invalid_order",
            InspectError::Session(SessionError::Io { .. }) => "io",
            InspectError::Session(SessionError::PathExhausted { .. }) => "path_exhausted",
            InspectError::Session(SessionError::Locked { .. }) => "session_locked",
            InspectError::InvalidImage { .. } => "invalid_image",
        }
    }
}
