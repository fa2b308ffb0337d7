pub mod authentication_flow;
pub(crate) mod util;

use http::{StatusCode, Uri};
use hyper::Client;

pub type HttpCli = Client<hyper_rustls::HttpsConnector<hyper::client::HttpConnector>>;

pub fn build_http_client() -> HttpCli {
    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();

    Client::builder().build::<_, hyper::Body>(https)
}

#[derive(thiserror::Error, Debug)]
pub enum RequestFailure {
    #[error("Transport error: '{0}'")]
    Transport(#[from] hyper::Error),
    #[error("Got status code {status} from {uri}, body: {body:?}")]
    Status {
        uri: Uri,
        status: StatusCode,
        body: String,
    },
    #[error("Malformed response body: '{0}'")]
    Decode(#[from] serde_json::Error),
    #[error("Response body was not utf-8: '{0}'")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("Unable to build request: '{0}'")]
    Request(#[from] http::Error),
    #[error("Invalid uri: '{0}'")]
    InvalidUri(#[from] http::uri::InvalidUri),
    #[error("Invalid redirect location {0:?}")]
    BadRedirect(String),
    #[error("Gave up after {0} redirects, last location {1}")]
    TooManyRedirects(usize, Uri),
}
