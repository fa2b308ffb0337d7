use crate::reference::ReferenceError;

use super::http::RequestFailure;

#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    InvalidReference(#[from] ReferenceError),
    #[error("Failed to fetch manifest for {repository}:{tag}: {source}")]
    ManifestFetchFailed {
        repository: String,
        tag: String,
        #[source]
        source: RequestFailure,
    },
    #[error("No model layer found in manifest for {repository}:{tag}")]
    ModelLayerNotFound { repository: String, tag: String },
    #[error("Layer digest {0:?} is not a valid content digest")]
    InvalidDigest(String),
    #[error("Unable to build blob location for {repository}: {source}")]
    InvalidBlobLocation {
        repository: String,
        #[source]
        source: RequestFailure,
    },
}
