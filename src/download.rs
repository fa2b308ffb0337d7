use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Error};
use http::{StatusCode, Uri};
use hyper::Body;
use indicatif::ProgressBar;
use sha2::Digest;
use tokio::io::AsyncWriteExt;
use tokio_stream::StreamExt;

use crate::reference::Reference;
use crate::registry::http::util::{dump_body_to_string, redirect_uri_fetch};
use crate::registry::http::{build_http_client, HttpCli};
use crate::registry::BlobDownloadInfo;

pub const BYTES_IN_MB: u64 = 1024 * 1024;
pub const BYTES_IN_GB: u64 = BYTES_IN_MB * 1024;

pub fn size_to_string(size: u64) -> String {
    let gb = size / BYTES_IN_GB;
    let mb = size / BYTES_IN_MB;
    if gb > 0 {
        let gb_flt = (gb as f64) + ((mb % 1024) as f64) / 1024_f64;
        format!("{:.2} GB", gb_flt)
    } else {
        format!("{} MB", mb)
    }
}

/// The layer title when it is a plain file name, otherwise `<digest hex>.gguf`.
pub fn model_file_name(info: &BlobDownloadInfo) -> String {
    let usable_title = info.filename.as_deref().filter(|t| {
        !t.is_empty() && *t != "." && *t != ".." && !t.contains('/') && !t.contains('\\')
    });
    match usable_title {
        Some(t) => t.to_string(),
        None => {
            let encoded = info
                .digest
                .split_once(':')
                .map(|(_, e)| e)
                .unwrap_or(info.digest.as_str());
            format!("{}.gguf", encoded)
        }
    }
}

/// `{models_dir}/oci/{repository}/{filename}`
pub fn model_target_path(
    models_dir: &Path,
    reference: &Reference,
    info: &BlobDownloadInfo,
) -> PathBuf {
    let mut path = models_dir.join("oci");
    for segment in reference.repository.split('/') {
        path.push(segment);
    }
    path.join(model_file_name(info))
}

#[async_trait::async_trait]
pub trait BlobDownloader {
    /// Streams the blob described by `info` into `target_file`, returning the
    /// number of bytes written.
    async fn download(
        &self,
        info: &BlobDownloadInfo,
        target_file: &Path,
        progress_bar: Option<ProgressBar>,
    ) -> Result<u64, Error>;
}

pub struct HttpBlobDownloader {
    http_client: HttpCli,
}

impl Default for HttpBlobDownloader {
    fn default() -> Self {
        Self {
            http_client: build_http_client(),
        }
    }
}

fn partial_path(target_file: &Path) -> PathBuf {
    let mut name = target_file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    target_file.with_file_name(name)
}

// Writes the body out while hashing it, returning the byte count and the hasher.
async fn stream_to_file(
    body: &mut Body,
    output: &mut tokio::fs::File,
    progress_bar: Option<&ProgressBar>,
) -> Result<(u64, sha2::Sha256), Error> {
    let mut total_bytes: u64 = 0;
    let mut hasher = sha2::Sha256::new();

    while let Some(chunk) = body.next().await {
        let data = chunk?;
        total_bytes += data.len() as u64;

        if let Some(progress_bar) = progress_bar {
            progress_bar.set_position(total_bytes);
        }

        if !data.is_empty() {
            hasher.update(&data[..]);
        }
        output.write_all(&data[..]).await?;
    }
    output.flush().await?;
    Ok((total_bytes, hasher))
}

#[async_trait::async_trait]
impl BlobDownloader for HttpBlobDownloader {
    async fn download(
        &self,
        info: &BlobDownloadInfo,
        target_file: &Path,
        progress_bar: Option<ProgressBar>,
    ) -> Result<u64, Error> {
        let uri = info
            .url
            .parse::<Uri>()
            .with_context(|| format!("Invalid blob url {:?}", info.url))?;

        let mut response = redirect_uri_fetch(&self.http_client, &uri, &info.headers)
            .await
            .with_context(|| format!("Requesting blob {}", info.digest))?;

        if response.status() != StatusCode::OK {
            bail!(
                "Attempted to download blob at uri {:#?}, but got status code {:#?}, body:{:#?}",
                uri,
                response.status(),
                dump_body_to_string(&mut response).await.unwrap_or_default()
            )
        }

        if let Some(parent) = target_file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let partial_file = partial_path(target_file);
        let mut tokio_output = tokio::fs::File::create(&partial_file)
            .await
            .with_context(|| {
                format!(
                    "Failed to open file to write to {:?} for download",
                    partial_file
                )
            })?;

        let streamed = stream_to_file(
            response.body_mut(),
            &mut tokio_output,
            progress_bar.as_ref(),
        )
        .await;
        drop(tokio_output);

        let (total_bytes, hasher) = match streamed {
            Ok(v) => v,
            Err(e) => {
                tokio::fs::remove_file(&partial_file).await.ok();
                return Err(e.context(format!("Downloading blob {}", info.digest)));
            }
        };

        if let Some(progress_bar) = &progress_bar {
            progress_bar.finish();
        }

        let sha_str = format!("sha256:{:x}", hasher.finalize());

        if total_bytes != info.size {
            tokio::fs::remove_file(&partial_file).await.ok();
            bail!(
                "Download produced the incorrect size. Expected {} bytes -- Got {} bytes",
                info.size,
                total_bytes
            )
        }

        if info.digest.starts_with("sha256:") {
            if info.digest != sha_str {
                tokio::fs::remove_file(&partial_file).await.ok();
                bail!(
                    "Download produced the incorrect sha. Expected {} / {} bytes -- Got {} / {} bytes",
                    info.digest,
                    info.size,
                    sha_str,
                    total_bytes
                )
            }
        } else {
            tracing::warn!(
                "Cannot verify digest {} with sha256, keeping unverified download",
                info.digest
            );
        }

        tokio::fs::rename(&partial_file, target_file)
            .await
            .with_context(|| format!("Failed to move download into place at {:?}", target_file))?;

        tracing::debug!(
            "Blob download complete for digest {}, stored at: {:?}",
            info.digest,
            target_file
        );
        Ok(total_bytes)
    }
}
