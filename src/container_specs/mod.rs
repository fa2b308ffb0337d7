pub mod manifest;

pub use manifest::{Manifest, ManifestReference};

pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
pub const DOCKER_MANIFEST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub enum SpecificationType {
    #[default]
    Oci,
    Docker,
}

impl SpecificationType {
    pub fn manifest_media_type(&self) -> &'static str {
        match self {
            SpecificationType::Oci => OCI_MANIFEST_MEDIA_TYPE,
            SpecificationType::Docker => DOCKER_MANIFEST_MEDIA_TYPE,
        }
    }

    pub fn from_manifest_media_type(media_type: &str) -> Option<SpecificationType> {
        // Registries sometimes append parameters, e.g. "; charset=utf-8".
        let media_type = media_type.split(';').next().unwrap_or("").trim();
        [SpecificationType::Oci, SpecificationType::Docker]
            .into_iter()
            .find(|s| s.manifest_media_type() == media_type)
    }

    /// Value for the `Accept` header of a manifest request, OCI first.
    pub fn accept_header() -> String {
        [SpecificationType::Oci, SpecificationType::Docker]
            .iter()
            .map(|s| s.manifest_media_type())
            .collect::<Vec<_>>()
            .join(",")
    }
}
