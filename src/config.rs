use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};

use crate::reference::{ReferenceDefaults, DEFAULT_ORG, DOCKER_HUB_HOST};

pub const DEFAULT_AUTH_REALM: &str = "https://auth.docker.io/token";
pub const DEFAULT_AUTH_SERVICE: &str = "registry.docker.io";

#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegistryScheme {
    #[default]
    Https,
    Http,
}

impl RegistryScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryScheme::Https => "https",
            RegistryScheme::Http => "http",
        }
    }
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone)]
#[serde(default)]
pub struct ResolverConfig {
    pub default_registry: String,
    pub default_org: String,
    pub auth_realm: String,
    pub auth_service: String,
    pub registry_scheme: RegistryScheme,
    pub models_dir: PathBuf,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_registry: DOCKER_HUB_HOST.to_string(),
            default_org: DEFAULT_ORG.to_string(),
            auth_realm: DEFAULT_AUTH_REALM.to_string(),
            auth_service: DEFAULT_AUTH_SERVICE.to_string(),
            registry_scheme: RegistryScheme::Https,
            models_dir: PathBuf::from("models"),
        }
    }
}

impl ResolverConfig {
    pub fn parse_file(f: impl AsRef<Path>) -> Result<ResolverConfig, Error> {
        let content = std::fs::read_to_string(f.as_ref())
            .with_context(|| format!("Failed to read config file {:?}", f.as_ref()))?;
        let u: ResolverConfig = serde_json::from_str(content.as_str()).with_context(|| {
            format!(
                "Attempting to parse resolver config from file: {},content:\n{}",
                f.as_ref().to_string_lossy(),
                content
            )
        })?;
        Ok(u)
    }

    pub fn reference_defaults(&self) -> ReferenceDefaults {
        ReferenceDefaults {
            registry: self.default_registry.clone(),
            org: self.default_org.clone(),
        }
    }
}
