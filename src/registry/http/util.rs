use std::collections::BTreeMap;

use http::{Response, Uri};
use hyper::Body;
use serde::de::DeserializeOwned;
use tokio_stream::StreamExt;

use super::{HttpCli, RequestFailure};

const MAX_REDIRECTS: usize = 10;

fn same_origin(a: &Uri, b: &Uri) -> bool {
    a.scheme() == b.scheme() && a.authority() == b.authority()
}

// Location headers may be relative, in which case the origin comes from the uri we just hit.
// A path without a leading '/' replaces the last segment of the current path.
fn resolve_location(current: &Uri, location: &str) -> Result<Uri, RequestFailure> {
    let bad_redirect = || RequestFailure::BadRedirect(location.to_string());

    if let Ok(location_uri) = location.parse::<Uri>() {
        // A bare "abc" parses as an authority, so a scheme is required too.
        if location_uri.scheme().is_some() && location_uri.host().is_some() {
            return Ok(location_uri);
        }
    }

    let path_and_query = if location.starts_with('/') {
        location.to_string()
    } else {
        let current_path = current.path();
        let directory = match current_path.rfind('/') {
            Some(idx) => &current_path[..=idx],
            None => "/",
        };
        format!("{}{}", directory, location)
    };

    let mut parts = current.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse().map_err(|_| bad_redirect())?);
    Uri::from_parts(parts).map_err(|_| bad_redirect())
}

#[async_recursion::async_recursion]
async fn inner_redirect_uri_fetch(
    client: &HttpCli,
    uri: &Uri,
    headers: &BTreeMap<String, String>,
    hops: usize,
) -> Result<Response<Body>, RequestFailure> {
    let mut req_builder = http::request::Builder::default()
        .method(http::Method::GET)
        .uri(uri);
    for (k, v) in headers.iter() {
        req_builder = req_builder.header(k.as_str(), v.as_str());
    }
    let request = req_builder.body(Body::empty())?;

    let r: Response<Body> = client.request(request).await?;

    if r.status().is_redirection() {
        if let Some(location_header) = r.headers().get(http::header::LOCATION) {
            let location_str = location_header
                .to_str()
                .map_err(|_| RequestFailure::BadRedirect(format!("{:?}", location_header)))?;
            let next_uri = resolve_location(uri, location_str)?;
            if hops >= MAX_REDIRECTS {
                return Err(RequestFailure::TooManyRedirects(hops, next_uri));
            }
            tracing::debug!("Following redirect from {} to {}", uri, next_uri);

            // Blob storage behind a registry rejects the registry's bearer token.
            let next_headers: BTreeMap<String, String> = if same_origin(uri, &next_uri) {
                headers.clone()
            } else {
                headers
                    .iter()
                    .filter(|(k, _)| !k.eq_ignore_ascii_case(http::header::AUTHORIZATION.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            };
            return inner_redirect_uri_fetch(client, &next_uri, &next_headers, hops + 1).await;
        }
    }

    Ok(r)
}

/// GETs `uri` with `headers`, following redirects.
pub(crate) async fn redirect_uri_fetch(
    client: &HttpCli,
    uri: &Uri,
    headers: &BTreeMap<String, String>,
) -> Result<Response<Body>, RequestFailure> {
    inner_redirect_uri_fetch(client, uri, headers, 0).await
}

pub(crate) async fn dump_body_to_string(
    response: &mut Response<Body>,
) -> Result<String, RequestFailure> {
    let mut buffer = Vec::default();
    while let Some(chunk) = response.body_mut().next().await {
        buffer.extend_from_slice(&chunk?);
    }
    let metadata = std::str::from_utf8(&buffer)?;
    Ok(metadata.to_string())
}

pub(crate) async fn fetch_json<T: DeserializeOwned>(
    client: &HttpCli,
    uri: &Uri,
    headers: &BTreeMap<String, String>,
) -> Result<T, RequestFailure> {
    let mut r = redirect_uri_fetch(client, uri, headers).await?;
    let body = dump_body_to_string(&mut r).await?;

    if !r.status().is_success() {
        return Err(RequestFailure::Status {
            uri: uri.clone(),
            status: r.status(),
            body,
        });
    }

    Ok(serde_json::from_str(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_location() {
        let current: Uri = "https://registry.example.com/v2/ai/x/blobs/sha256:00"
            .parse()
            .unwrap();
        let next = resolve_location(&current, "/storage/abc?sig=1").unwrap();
        assert_eq!(next.to_string(), "https://registry.example.com/storage/abc?sig=1");
        assert!(same_origin(&current, &next));
    }

    #[test]
    fn test_resolve_path_relative_location() {
        let current: Uri = "https://registry.example.com/v2/ai/x/blobs/sha256:00"
            .parse()
            .unwrap();
        let next = resolve_location(&current, "storage/abc").unwrap();
        assert_eq!(
            next.to_string(),
            "https://registry.example.com/v2/ai/x/blobs/storage/abc"
        );

        let next = resolve_location(&current, "abc?sig=1").unwrap();
        assert!(same_origin(&current, &next));
        assert_eq!(
            next.to_string(),
            "https://registry.example.com/v2/ai/x/blobs/abc?sig=1"
        );
    }

    #[test]
    fn test_resolve_bad_location() {
        let current: Uri = "https://registry.example.com/v2/ai/x/blobs/sha256:00"
            .parse()
            .unwrap();
        assert!(matches!(
            resolve_location(&current, "has a space"),
            Err(RequestFailure::BadRedirect(_))
        ));
    }

    #[test]
    fn test_resolve_absolute_location() {
        let current: Uri = "https://registry.example.com/v2/ai/x/blobs/sha256:00"
            .parse()
            .unwrap();
        let next = resolve_location(&current, "https://cdn.example.net/abc").unwrap();
        assert_eq!(next.host(), Some("cdn.example.net"));
        assert!(!same_origin(&current, &next));
    }
}
