use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

use super::SpecificationType;

pub const TITLE_ANNOTATION: &str = "org.opencontainers.image.title";
pub const ARTIFACT_CREATED_ANNOTATION: &str = "org.opencontainers.artifact.created";

#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Default, Clone)]
pub struct ManifestReference {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub size: u64,
    pub digest: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl ManifestReference {
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(|v| v.as_str())
    }

    pub fn title(&self) -> Option<&str> {
        self.annotation(TITLE_ANNOTATION)
    }
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone)]
pub struct Manifest {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u16,

    // Optional in the OCI image spec, always present for docker v2 manifests.
    #[serde(rename = "mediaType", default)]
    pub media_type: String,

    pub config: ManifestReference,

    #[serde(default)]
    pub layers: Vec<ManifestReference>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            schema_version: 2,
            media_type: String::from(super::OCI_MANIFEST_MEDIA_TYPE),
            config: Default::default(),
            layers: Default::default(),
        }
    }
}

impl Manifest {
    pub fn specification_type(&self) -> Option<SpecificationType> {
        SpecificationType::from_manifest_media_type(&self.media_type)
    }
}
