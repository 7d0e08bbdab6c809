//! Forwarding to the upstream service.

use super::error::{GatewayError, GatewayResult};
use bytes::Bytes;
use http::header::{self, HeaderName};
use http::uri::{Authority, Scheme};
use http::{HeaderMap, HeaderValue, Request, Response, Uri};
use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

/// Body type of forwarded requests.
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Headers that only apply to a single connection.
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove(header::TRANSFER_ENCODING);
}

/// HTTP/1 client bound to one upstream base URL.
#[derive(Debug, Clone)]
pub struct Upstream {
    client: Client<HttpConnector, ProxyBody>,
    scheme: Scheme,
    authority: Authority,
    base_path: String,
}

impl Upstream {
    /// Create a client for `base`, e.g. `http://127.0.0.1:8000`.
    ///
    /// # Errors
    ///
    /// Returns an error if `base` is not an absolute `http` URL.
    pub fn new(base: &str, connect_timeout: Duration) -> GatewayResult<Self> {
        let uri: Uri = base
            .parse()
            .map_err(|e| GatewayError::InvalidUpstream(format!("{base}: {e}")))?;
        let scheme = uri
            .scheme()
            .cloned()
            .ok_or_else(|| GatewayError::InvalidUpstream(format!("{base}: missing scheme")))?;
        if scheme != Scheme::HTTP {
            return Err(GatewayError::InvalidUpstream(format!(
                "{base}: only http upstreams are supported"
            )));
        }
        let authority = uri
            .authority()
            .cloned()
            .ok_or_else(|| GatewayError::InvalidUpstream(format!("{base}: missing host")))?;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            client,
            scheme,
            authority,
            base_path: uri.path().trim_end_matches('/').to_string(),
        })
    }

    /// Upstream URI for a request URI.
    ///
    /// # Errors
    ///
    /// Returns an error if the joined URI is invalid.
    pub fn target_uri(&self, uri: &Uri) -> GatewayResult<Uri> {
        let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
        Ok(Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(format!("{}{path_and_query}", self.base_path))
            .build()?)
    }

    /// Forward a request and return the upstream response.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream cannot be reached.
    pub async fn forward(&self, req: Request<Incoming>) -> GatewayResult<Response<Incoming>> {
        let (mut parts, body) = req.into_parts();
        parts.uri = self.target_uri(&parts.uri)?;
        strip_hop_by_hop(&mut parts.headers);
        if let Ok(host) = HeaderValue::from_str(self.authority.as_str()) {
            parts.headers.insert(header::HOST, host);
        }

        let req = Request::from_parts(parts, body.boxed());
        let mut resp = self.client.request(req).await?;
        strip_hop_by_hop(resp.headers_mut());
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_uri() {
        let upstream = Upstream::new("http://10.0.0.1:8000/api/", Duration::from_secs(1)).unwrap();
        let target = upstream
            .target_uri(&"/users/42?page=2".parse().unwrap())
            .unwrap();
        assert_eq!(target.to_string(), "http://10.0.0.1:8000/api/users/42?page=2");

        let upstream = Upstream::new("http://backend:8000", Duration::from_secs(1)).unwrap();
        let target = upstream.target_uri(&"/a/1".parse().unwrap()).unwrap();
        assert_eq!(target.to_string(), "http://backend:8000/a/1");
    }

    #[test]
    fn test_rejects_bad_upstream() {
        assert!(Upstream::new("backend:8000/x", Duration::from_secs(1)).is_err());
        assert!(Upstream::new("https://backend", Duration::from_secs(1)).is_err());
        assert!(Upstream::new("/relative", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        strip_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::CONTENT_TYPE));
    }
}
