//! Import error types
//!
//! Only container-level problems abort an import. Everything else is produced
//! by leaf helpers and degraded by the calling stage with a logged warning.

use std::path::PathBuf;

/// Errors raised while importing a glTF asset
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// Input shorter than the 12-byte GLB header
    #[error("file too small to contain a GLB header ({0} bytes)")]
    TooSmall(usize),

    /// First four bytes are not "glTF"
    #[error("invalid GLB magic {0:02X?}")]
    InvalidMagic([u8; 4]),

    /// GLB container version other than 2
    #[error("unsupported GLB version {0} (expected 2)")]
    UnsupportedVersion(u32),

    /// Chunk table is inconsistent (truncated chunk, JSON not first, ...)
    #[error("malformed GLB container: {0}")]
    MalformedContainer(String),

    /// JSON syntax or structure error
    #[error("invalid glTF JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A required top-level field is absent
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// `asset.version` is not a 2.x version
    #[error("unsupported glTF asset version '{0}'")]
    UnsupportedAssetVersion(String),

    /// File system failure
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed `data:` URI
    #[error("invalid data URI: {0}")]
    InvalidDataUri(String),

    /// Buffer or image reference that cannot be resolved locally
    #[error("unresolvable URI '{0}'")]
    UnresolvableUri(String),

    /// Image codec failure
    #[error("image decode failed: {0}")]
    ImageDecode(String),

    /// Draco codec failure
    #[error("draco decode failed: {0}")]
    Draco(String),

    /// Settings file could not be parsed
    #[error("invalid import settings: {0}")]
    Settings(#[from] toml::de::Error),

    /// The import job was cancelled before completion
    #[error("import was cancelled")]
    Cancelled,

    /// No task could make progress (dependency on an unregistered task)
    #[error("task graph stalled: {0}")]
    Stalled(String),
}

impl ImportError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ImportError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts a whole import
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ImportError::TooSmall(_)
                | ImportError::InvalidMagic(_)
                | ImportError::UnsupportedVersion(_)
                | ImportError::MalformedContainer(_)
                | ImportError::Json(_)
                | ImportError::MissingField(_)
                | ImportError::UnsupportedAssetVersion(_)
                | ImportError::Cancelled
                | ImportError::Stalled(_)
        )
    }
}

/// Result alias for import operations
pub type Result<T> = std::result::Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ImportError::UnsupportedVersion(1).to_string(),
            "unsupported GLB version 1 (expected 2)"
        );
        assert_eq!(
            ImportError::MissingField("asset").to_string(),
            "missing required field `asset`"
        );
        assert_eq!(
            ImportError::InvalidMagic(*b"abcd").to_string(),
            "invalid GLB magic [61, 62, 63, 64]"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ImportError::InvalidMagic(*b"nope").is_fatal());
        assert!(ImportError::Cancelled.is_fatal());
        assert!(!ImportError::ImageDecode("bad png".into()).is_fatal());
        assert!(!ImportError::Draco("corrupt".into()).is_fatal());
    }
}
