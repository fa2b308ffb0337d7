use serde::{Deserialize, Serialize};

use crate::container_specs::manifest::{ARTIFACT_CREATED_ANNOTATION, TITLE_ANNOTATION};
use crate::container_specs::{Manifest, ManifestReference};

const MODEL_FILE_MARKER: &str = ".gguf";

#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone)]
pub struct ModelLayer {
    pub digest: String,
    pub size: u64,
    pub title: Option<String>,
}

impl From<&ManifestReference> for ModelLayer {
    fn from(layer: &ManifestReference) -> Self {
        ModelLayer {
            digest: layer.digest.clone(),
            size: layer.size,
            title: layer.title().map(|t| t.to_string()),
        }
    }
}

// The artifact.created key is meant to be a timestamp, some pushers have been
// seen putting the file name there. Matching on it is kept for compatibility.
fn annotated_as_model(layer: &ManifestReference) -> bool {
    [TITLE_ANNOTATION, ARTIFACT_CREATED_ANNOTATION]
        .iter()
        .filter_map(|key| layer.annotation(key))
        .any(|v| v.to_lowercase().contains(MODEL_FILE_MARKER))
}

/// Picks the layer carrying the model weights.
///
/// The first layer annotated with a `.gguf` file name wins outright. Without
/// any such annotation the strictly largest layer is taken, the earliest one
/// on a tie. An empty manifest yields `None`.
pub fn find_model_layer(manifest: &Manifest) -> Option<ModelLayer> {
    let mut largest: Option<&ManifestReference> = None;

    for layer in manifest.layers.iter() {
        if annotated_as_model(layer) {
            return Some(layer.into());
        }
        if largest.map(|l| layer.size > l.size).unwrap_or(true) {
            largest = Some(layer);
        }
    }

    largest.map(|l| l.into())
}
