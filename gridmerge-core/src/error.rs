//! Error Taxonomy
//!
//! Every merge ends in either a complete buffer or exactly one `MergeError`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fetch::FetchError;
use crate::resources::ResourceError;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Invalid parameters for merge: {0}")]
    InvalidParameters(String),

    #[error("Error processing image {index} ({uri}): {cause}")]
    FetchFailure {
        index: usize,
        uri: String,
        #[source]
        cause: FetchError,
    },

    #[error("Error decoding image {index} ({uri}): {cause}")]
    DecodeFailure {
        index: usize,
        uri: String,
        #[source]
        cause: image::ImageError,
    },

    #[error("Composite failed: {0}")]
    CompositeFailure(String),
}

/// Stable, serializable name for each failure kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidParameters,
    FetchFailure,
    DecodeFailure,
    CompositeFailure,
}

impl MergeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MergeError::InvalidParameters(_) => ErrorKind::InvalidParameters,
            MergeError::FetchFailure { .. } => ErrorKind::FetchFailure,
            MergeError::DecodeFailure { .. } => ErrorKind::DecodeFailure,
            MergeError::CompositeFailure(_) => ErrorKind::CompositeFailure,
        }
    }

    /// Index of the offending image, when one image is to blame
    pub fn index(&self) -> Option<usize> {
        match self {
            MergeError::FetchFailure { index, .. } | MergeError::DecodeFailure { index, .. } => {
                Some(*index)
            }
            _ => None,
        }
    }

    pub fn uri(&self) -> Option<&str> {
        match self {
            MergeError::FetchFailure { uri, .. } | MergeError::DecodeFailure { uri, .. } => {
                Some(uri)
            }
            _ => None,
        }
    }
}

impl From<ResourceError> for MergeError {
    fn from(err: ResourceError) -> Self {
        MergeError::CompositeFailure(format!("temporary storage: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_failure_context() {
        let err = MergeError::FetchFailure {
            index: 3,
            uri: "https://cdn.example.com/a.png".to_string(),
            cause: FetchError::Status(404),
        };
        assert_eq!(err.kind(), ErrorKind::FetchFailure);
        assert_eq!(err.index(), Some(3));
        assert_eq!(err.uri(), Some("https://cdn.example.com/a.png"));
        assert!(err.to_string().contains("404"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_invalid_parameters_has_no_index() {
        let err = MergeError::InvalidParameters("width must be positive".into());
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);
        assert_eq!(err.index(), None);
        assert_eq!(err.uri(), None);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::CompositeFailure).unwrap();
        assert_eq!(json, r#""composite_failure""#);
    }
}
