use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid http method: {0}")]
    InvalidMethod(String),

    #[error("only http:// URLs are supported for now: {0}")]
    OnlyHttpSupported(String),

    #[error("http request build failed: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("invalid http header name: {0}")]
    HeaderName(#[from] http::header::InvalidHeaderName),

    #[error("invalid http header value: {0}")]
    HeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("http request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),

    #[error("http request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to read response body: {0}")]
    BodyRead(#[from] hyper::Error),
}

/// Coarse classification of transport-level failures, used as a metrics tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum TransportErrorKind {
    InvalidUrl,
    Connect,
    Timeout,
    BodyRead,
    Protocol,
}

impl Error {
    pub fn transport_kind(&self) -> TransportErrorKind {
        match self {
            Error::InvalidUrl(_) | Error::OnlyHttpSupported(_) => TransportErrorKind::InvalidUrl,
            Error::Request(err) if err.is_connect() => TransportErrorKind::Connect,
            Error::Timeout(_) => TransportErrorKind::Timeout,
            Error::BodyRead(_) => TransportErrorKind::BodyRead,
            Error::Request(_)
            | Error::RequestBuild(_)
            | Error::InvalidMethod(_)
            | Error::HeaderName(_)
            | Error::HeaderValue(_) => TransportErrorKind::Protocol,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn body_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: &str) -> Self {
        Self::get_owned(url.to_string())
    }

    pub fn get_owned(url: String) -> Self {
        Self {
            method: http::Method::GET,
            url,
            headers: Vec::new(),
            body: Bytes::new(),
            timeout: None,
        }
    }

    pub fn post_owned(url: String, body: Bytes) -> Self {
        Self {
            method: http::Method::POST,
            url,
            headers: Vec::new(),
            body,
            timeout: None,
        }
    }

    /// Build a request from string parts (descriptor-shaped input).
    pub fn from_parts(method: &str, url: String, body: Option<String>) -> Result<Self> {
        let method: http::Method = method
            .parse()
            .map_err(|_| Error::InvalidMethod(method.to_string()))?;
        Ok(Self {
            method,
            url,
            headers: Vec::new(),
            body: body.map(Bytes::from).unwrap_or_default(),
            timeout: None,
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpConnector, Full<Bytes>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        let mut connector = HttpConnector::new();
        connector.enforce_http(false);

        let inner = Client::builder(TokioExecutor::new()).build(connector);

        Self { inner }
    }
}

impl HttpClient {
    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        let timeout = req.timeout;
        let parsed = url::Url::parse(&req.url).map_err(|_| Error::InvalidUrl(req.url.clone()))?;
        if parsed.scheme() != "http" {
            return Err(Error::OnlyHttpSupported(req.url));
        }

        let uri: hyper::Uri = req
            .url
            .parse()
            .map_err(|_| Error::InvalidUrl(req.url.to_string()))?;

        let mut builder = Request::builder().method(req.method).uri(uri);

        if !req.body.is_empty() && !has_header(&req.headers, "content-length") {
            builder = builder.header(http::header::CONTENT_LENGTH, req.body.len());
        }

        for (k, v) in req.headers {
            let name = http::header::HeaderName::from_bytes(k.as_bytes())?;
            let value = http::header::HeaderValue::from_str(&v)?;
            builder = builder.header(name, value);
        }

        let req: Request<Full<Bytes>> = builder.body(Full::new(req.body))?;

        // The timeout covers the full request/response exchange, body included.
        let response = async {
            let res: hyper::Response<Incoming> = self.inner.request(req).await?;
            let (parts, body) = res.into_parts();
            let status = parts.status.as_u16();
            let body = body.collect().await?.to_bytes();
            Ok(HttpResponse { status, body })
        };

        if let Some(timeout) = timeout {
            match tokio::time::timeout(timeout, response).await {
                Ok(res) => res,
                Err(_) => Err(Error::Timeout(timeout)),
            }
        } else {
            response.await
        }
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.request(HttpRequest::get(url)).await
    }
}

fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_is_rejected() {
        let err = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map(|rt| rt.block_on(HttpClient::default().get("https://example.com/")))
        {
            Ok(Err(err)) => err,
            Ok(Ok(_)) => panic!("expected error"),
            Err(err) => panic!("runtime: {err}"),
        };
        assert!(matches!(err, Error::OnlyHttpSupported(_)));
        assert_eq!(err.transport_kind(), TransportErrorKind::InvalidUrl);
    }

    #[test]
    fn timeout_classifies_as_timeout() {
        let err = Error::Timeout(Duration::from_secs(1));
        assert!(err.is_timeout());
        assert_eq!(err.transport_kind(), TransportErrorKind::Timeout);
    }
}
