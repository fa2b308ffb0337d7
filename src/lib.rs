use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Error};
use clap::{Args, Parser};
use indicatif::{ProgressBar, ProgressStyle};

use config::{RegistryScheme, ResolverConfig};
use download::{BlobDownloader, HttpBlobDownloader};
use registry::{BlobDownloadInfo, ModelRegistry, RegistryClient};

#[derive(Args, Debug, Clone, Default)]
pub struct ResolverArgs {
    /// JSON file with resolver settings, flags below override it.
    #[clap(long, env = "OCI_MODEL_CONFIG")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "OCI_MODEL_DEFAULT_REGISTRY")]
    pub default_registry: Option<String>,

    #[clap(long, env = "OCI_MODEL_DEFAULT_ORG")]
    pub default_org: Option<String>,

    #[clap(long, env = "OCI_MODEL_AUTH_REALM")]
    pub auth_realm: Option<String>,

    #[clap(long, env = "OCI_MODEL_AUTH_SERVICE")]
    pub auth_service: Option<String>,

    /// Talk plain http to registries, for local test registries.
    #[clap(long, env = "OCI_MODEL_INSECURE_HTTP")]
    pub insecure_http: bool,

    #[clap(long)]
    pub timeout_secs: Option<u64>,
}

impl ResolverArgs {
    pub fn load_config(&self) -> Result<ResolverConfig, Error> {
        let mut config = match &self.config_path {
            Some(path) => ResolverConfig::parse_file(path)?,
            None => ResolverConfig::default(),
        };
        if let Some(v) = &self.default_registry {
            config.default_registry = v.clone();
        }
        if let Some(v) = &self.default_org {
            config.default_org = v.clone();
        }
        if let Some(v) = &self.auth_realm {
            config.auth_realm = v.clone();
        }
        if let Some(v) = &self.auth_service {
            config.auth_service = v.clone();
        }
        if self.insecure_http {
            config.registry_scheme = RegistryScheme::Http;
        }
        Ok(config)
    }

    async fn with_deadline<T, Fut>(&self, fut: Fut) -> Result<T, Error>
    where
        Fut: Future<Output = Result<T, Error>>,
    {
        match self.timeout_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), fut).await {
                Err(_) => bail!("Timed out after waiting {} seconds.", secs),
                Ok(r) => r,
            },
            None => fut.await,
        }
    }
}

async fn resolve_reference(
    registry: &dyn ModelRegistry,
    resolver: &ResolverArgs,
    reference: &str,
) -> Result<BlobDownloadInfo, Error> {
    resolver
        .with_deadline(async {
            registry
                .get_model_download_url(reference)
                .await
                .with_context(|| format!("Resolving model reference {:?}", reference))
        })
        .await
}

#[derive(Parser, Debug)]
#[clap(name = "resolve app")]
pub struct ResolveOpt {
    /// Model reference, e.g. `gemma3`, `myorg/model:v1` or `ghcr.io/org/model:v2`.
    pub reference: String,

    #[clap(flatten)]
    pub resolver: ResolverArgs,

    /// Write the descriptor here instead of stdout.
    #[clap(long)]
    pub output_path: Option<PathBuf>,
}

pub async fn resolve_main(opt: ResolveOpt) -> Result<BlobDownloadInfo, Error> {
    let config = opt.resolver.load_config()?;
    let client = RegistryClient::new(config);

    let info = resolve_reference(&client, &opt.resolver, &opt.reference).await?;

    match &opt.output_path {
        Some(path) => {
            use std::fs::File;
            use std::io::{BufWriter, Write};

            let file = File::create(path)
                .with_context(|| format!("Failed to create output file {:?}", path))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &info)?;
            writer
                .flush()
                .with_context(|| format!("Failed to write descriptor to {:?}", path))?;
        }
        None => println!("{}", serde_json::to_string_pretty(&info)?),
    }

    Ok(info)
}

#[derive(Parser, Debug)]
#[clap(name = "puller app")]
pub struct PullOpt {
    pub reference: String,

    #[clap(flatten)]
    pub resolver: ResolverArgs,

    /// Overrides `models_dir` from the config.
    #[clap(long, env = "OCI_MODEL_MODELS_DIR")]
    pub models_dir: Option<PathBuf>,

    #[clap(long)]
    pub no_progress: bool,
}

pub struct PullOutcome {
    pub info: BlobDownloadInfo,
    pub path: PathBuf,
    pub bytes: u64,
}

pub async fn pull_main(opt: PullOpt) -> Result<PullOutcome, Error> {
    let config = opt.resolver.load_config()?;
    let models_dir = opt
        .models_dir
        .clone()
        .unwrap_or_else(|| config.models_dir.clone());
    let client = RegistryClient::new(config);
    let reference = client.parse_reference(&opt.reference)?;

    let info = resolve_reference(&client, &opt.resolver, &opt.reference).await?;

    let path = download::model_target_path(&models_dir, &reference, &info);
    tracing::info!(
        "Downloading {} ({}) to {:?}",
        info.digest,
        download::size_to_string(info.size),
        path
    );

    let progress_bar = if opt.no_progress {
        None
    } else {
        let pb = ProgressBar::new(info.size);
        pb.set_style(
            ProgressStyle::with_template("{msg:25} {bytes}/{total_bytes} {bar:60.green/yellow}")
                .context("Invalid progress bar template")?,
        );
        pb.set_message(download::model_file_name(&info));
        Some(pb)
    };

    let downloader = HttpBlobDownloader::default();
    let bytes = downloader.download(&info, &path, progress_bar).await?;

    Ok(PullOutcome { info, path, bytes })
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

pub mod config;
pub mod container_specs;
pub mod download;
pub mod reference;
pub mod registry;
