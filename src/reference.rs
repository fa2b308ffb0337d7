use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DOCKER_HUB_HOST: &str = "docker.io";
pub const DOCKER_HUB_API_HOST: &str = "registry-1.docker.io";
pub const DEFAULT_ORG: &str = "ai";
pub const DEFAULT_TAG: &str = "latest";

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum ReferenceError {
    #[error("Model reference is empty")]
    Empty,
    #[error("Model reference {0:?} contains an empty path segment")]
    EmptySegment(String),
    #[error("Model reference {0:?} has no model name")]
    EmptyName(String),
    #[error("Model reference {0:?} has more than one ':' in its tag")]
    InvalidTag(String),
}

/// Registry and organisation applied to references that leave them out.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ReferenceDefaults {
    pub registry: String,
    pub org: String,
}

impl Default for ReferenceDefaults {
    fn default() -> Self {
        Self {
            registry: DOCKER_HUB_HOST.to_string(),
            org: DEFAULT_ORG.to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone)]
pub struct Reference {
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

impl FromStr for Reference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Reference::parse_with(s, &ReferenceDefaults::default())
    }
}

impl Reference {
    pub fn parse(reference: impl AsRef<str>) -> Result<Reference, ReferenceError> {
        reference.as_ref().parse()
    }

    /// Accepted forms:
    ///   name[:tag]                 -> {default registry}/{default org}/name
    ///   org/name[:tag]             -> {default registry}/org/name
    ///   host.tld/name[:tag]        -> host.tld/{default org}/name
    ///   host/org/.../name[:tag]    -> host/org/.../name
    /// each optionally prefixed with http:// or https://.
    pub fn parse_with(
        reference: &str,
        defaults: &ReferenceDefaults,
    ) -> Result<Reference, ReferenceError> {
        let raw = strip_scheme(reference.trim());
        if raw.is_empty() {
            return Err(ReferenceError::Empty);
        }

        let segments: Vec<&str> = raw.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(ReferenceError::EmptySegment(reference.to_string()));
        }

        let (registry, org, last) = match segments.as_slice() {
            [last] => (defaults.registry.as_str(), defaults.org.clone(), *last),
            // A dot in the first segment is what separates a registry host from an org.
            [first, last] if first.contains('.') => (*first, defaults.org.clone(), *last),
            [first, last] => (defaults.registry.as_str(), first.to_string(), *last),
            [first, middle @ .., last] => (*first, middle.join("/"), *last),
            [] => return Err(ReferenceError::Empty),
        };

        let (name, tag) = split_tag(last);
        if tag.contains(':') {
            return Err(ReferenceError::InvalidTag(reference.to_string()));
        }
        if name.is_empty() {
            return Err(ReferenceError::EmptyName(reference.to_string()));
        }

        Ok(Reference {
            registry: canonical_registry(registry).to_string(),
            repository: format!("{}/{}", org, name),
            tag: tag.to_string(),
        })
    }
}

fn strip_scheme(reference: &str) -> &str {
    for scheme in ["https://", "http://"] {
        if reference.len() >= scheme.len()
            && reference.is_char_boundary(scheme.len())
            && reference[..scheme.len()].eq_ignore_ascii_case(scheme)
        {
            return &reference[scheme.len()..];
        }
    }
    reference
}

// A trailing ':' with nothing after it falls back to the default tag.
fn split_tag(segment: &str) -> (&str, &str) {
    match segment.split_once(':') {
        Some((name, tag)) if !tag.is_empty() => (name, tag),
        Some((name, _)) => (name, DEFAULT_TAG),
        None => (segment, DEFAULT_TAG),
    }
}

/// Docker Hub is advertised as docker.io but serves the registry API elsewhere.
pub fn canonical_registry(registry: &str) -> &str {
    if registry.eq_ignore_ascii_case(DOCKER_HUB_HOST) {
        DOCKER_HUB_API_HOST
    } else {
        registry
    }
}
