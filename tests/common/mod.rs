#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use sha2::Digest;

use oci_model_tools::config::{RegistryScheme, ResolverConfig};

pub const TOKEN: &str = "test-token";
pub const BLOB_BYTES: &[u8] = b"GGUF fake model weights";

pub fn blob_digest() -> String {
    format!("sha256:{:x}", sha2::Sha256::digest(BLOB_BYTES))
}

#[derive(Default)]
struct State {
    token_requests: AtomicUsize,
    token_queries: Mutex<Vec<String>>,
    mirror_location: Mutex<Option<String>>,
}

/// A registry plus token endpoint served over plain http on localhost.
pub struct FakeRegistry {
    pub addr: SocketAddr,
    state: Arc<State>,
}

fn layer_json(digest: &str, size: usize, title: Option<&str>) -> String {
    match title {
        Some(t) => format!(
            r#"{{"mediaType":"application/vnd.docker.ai.gguf.v3","size":{},"digest":"{}","annotations":{{"org.opencontainers.image.title":"{}"}}}}"#,
            size, digest, t
        ),
        None => format!(
            r#"{{"mediaType":"application/vnd.docker.ai.gguf.v3","size":{},"digest":"{}"}}"#,
            size, digest
        ),
    }
}

fn manifest_json(layers: &[String]) -> String {
    format!(
        r#"{{"schemaVersion":2,"mediaType":"application/vnd.oci.image.manifest.v1+json","config":{{"mediaType":"application/vnd.docker.ai.model.config.v0.1+json","size":12,"digest":"sha256:0000000000000000000000000000000000000000000000000000000000000001"}},"layers":[{}]}}"#,
        layers.join(",")
    )
}

fn respond(status: StatusCode, body: impl Into<Body>) -> Response<Body> {
    Response::builder().status(status).body(body.into()).unwrap()
}

fn has_token(req: &Request<Body>) -> bool {
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        == Some(format!("Bearer {}", TOKEN).as_str())
}

fn accepts_oci(req: &Request<Body>) -> bool {
    req.headers()
        .get("accept")
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.contains("application/vnd.oci.image.manifest.v1+json")
                && v.contains("application/vnd.docker.distribution.manifest.v2+json")
        })
        .unwrap_or(false)
}

fn route(req: Request<Body>, state: &State) -> Response<Body> {
    let path = req.uri().path().to_string();
    let license = layer_json(
        "sha256:00000000000000000000000000000000000000000000000000000000000000ff",
        4096,
        None,
    );

    match path.as_str() {
        "/token" => {
            state.token_requests.fetch_add(1, Ordering::SeqCst);
            state
                .token_queries
                .lock()
                .unwrap()
                .push(req.uri().query().unwrap_or("").to_string());
            respond(
                StatusCode::OK,
                format!(r#"{{"token":"{}","expires_in":300}}"#, TOKEN),
            )
        }
        "/broken-token" => {
            state.token_requests.fetch_add(1, Ordering::SeqCst);
            respond(StatusCode::INTERNAL_SERVER_ERROR, "boom")
        }
        "/v2/ai/gemma3/manifests/latest" => {
            if !has_token(&req) {
                return respond(StatusCode::UNAUTHORIZED, r#"{"errors":[]}"#);
            }
            if !accepts_oci(&req) {
                return respond(StatusCode::NOT_ACCEPTABLE, "");
            }
            respond(
                StatusCode::OK,
                manifest_json(&[
                    layer_json(&blob_digest(), BLOB_BYTES.len(), Some("model.gguf")),
                    license,
                ]),
            )
        }
        "/v2/ai/public/manifests/latest" => respond(
            StatusCode::OK,
            manifest_json(&[
                layer_json(
                    "sha256:00000000000000000000000000000000000000000000000000000000000000aa",
                    3,
                    None,
                ),
                layer_json(&blob_digest(), BLOB_BYTES.len(), None),
                layer_json(
                    "sha256:00000000000000000000000000000000000000000000000000000000000000bb",
                    5,
                    None,
                ),
            ]),
        ),
        "/v2/ai/empty/manifests/latest" => respond(StatusCode::OK, manifest_json(&[])),
        "/v2/ai/garbage/manifests/latest" => respond(StatusCode::OK, "this is not json"),
        p if p.starts_with("/v2/ai/gemma3/blobs/") => {
            if !has_token(&req) {
                return respond(StatusCode::UNAUTHORIZED, "");
            }
            Response::builder()
                .status(StatusCode::TEMPORARY_REDIRECT)
                .header("Location", "/storage/gemma3-blob")
                .body(Body::empty())
                .unwrap()
        }
        "/storage/gemma3-blob" => {
            if !has_token(&req) {
                return respond(StatusCode::UNAUTHORIZED, "");
            }
            respond(StatusCode::OK, BLOB_BYTES)
        }
        p if p.starts_with("/v2/ai/public/blobs/") => respond(StatusCode::OK, BLOB_BYTES),
        p if p.starts_with("/v2/ai/mirrored/blobs/") => {
            if !has_token(&req) {
                return respond(StatusCode::UNAUTHORIZED, "");
            }
            let location = state.mirror_location.lock().unwrap().clone();
            match location {
                Some(location) => Response::builder()
                    .status(StatusCode::TEMPORARY_REDIRECT)
                    .header("Location", location)
                    .body(Body::empty())
                    .unwrap(),
                None => respond(StatusCode::NOT_FOUND, ""),
            }
        }
        // Plays a blob CDN, which refuses any registry credentials.
        "/cdn/blob" => {
            if req.headers().contains_key("authorization") {
                return respond(StatusCode::UNAUTHORIZED, "unexpected credentials");
            }
            respond(StatusCode::OK, BLOB_BYTES)
        }
        "/truncated/blob" => {
            let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
                Ok(BLOB_BYTES[..4].to_vec()),
                Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection dropped",
                )),
            ];
            respond(StatusCode::OK, Body::wrap_stream(tokio_stream::iter(chunks)))
        }
        _ => respond(
            StatusCode::NOT_FOUND,
            r#"{"errors":[{"code":"MANIFEST_UNKNOWN"}]}"#,
        ),
    }
}

impl FakeRegistry {
    pub async fn start() -> FakeRegistry {
        let state = Arc::new(State::default());
        let service_state = Arc::clone(&state);

        let make_svc = make_service_fn(move |_conn| {
            let state = Arc::clone(&service_state);
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { Ok::<_, Infallible>(route(req, &state)) }
                }))
            }
        });

        let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_svc);
        let addr = server.local_addr();
        tokio::spawn(server);

        FakeRegistry { addr, state }
    }

    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub fn reference(&self, repository: &str) -> String {
        format!("{}/{}", self.host(), repository)
    }

    pub fn token_realm(&self) -> String {
        format!("http://{}/token", self.addr)
    }

    pub fn broken_token_realm(&self) -> String {
        format!("http://{}/broken-token", self.addr)
    }

    pub fn config(&self) -> ResolverConfig {
        ResolverConfig {
            auth_realm: self.token_realm(),
            registry_scheme: RegistryScheme::Http,
            ..Default::default()
        }
    }

    pub fn cdn_blob_url(&self) -> String {
        format!("http://{}/cdn/blob", self.addr)
    }

    pub fn truncated_blob_url(&self) -> String {
        format!("http://{}/truncated/blob", self.addr)
    }

    /// Blob requests under `ai/mirrored` redirect to `location`.
    pub fn redirect_mirrored_blobs_to(&self, location: &str) {
        *self.state.mirror_location.lock().unwrap() = Some(location.to_string());
    }

    pub fn token_requests(&self) -> usize {
        self.state.token_requests.load(Ordering::SeqCst)
    }

    pub fn token_queries(&self) -> Vec<String> {
        self.state.token_queries.lock().unwrap().clone()
    }
}
