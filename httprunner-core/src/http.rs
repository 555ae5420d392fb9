/// httprunner's HTTP transport is a thin wrapper for `reqwest::Client` that
/// * never follows redirects by itself, the executor decides which ones to chase
/// * accepts invalid certificates
/// * captures request and response logs for verbose reporting
use reqwest::header::HeaderMap;
use tracing::*;

use crate::Result;

#[derive(Debug, Clone)]
pub struct LogRequest {
    pub url: reqwest::Url,
    pub method: reqwest::Method,
    pub headers: HeaderMap,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct LogResponse {
    pub status: reqwest::StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct Log {
    pub request: LogRequest,
    pub response: LogResponse,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: reqwest::Method,
    pub url: reqwest::Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: reqwest::StatusCode,
    pub headers: HeaderMap,
    pub text: String,
}

impl Response {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
    }
}

#[derive(Clone)]
pub struct Transport {
    inner: reqwest::Client,
}

impl Transport {
    pub fn new() -> Result<Transport> {
        let builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        #[cfg(any(feature = "native-tls", feature = "rustls-tls"))]
        let builder = builder.danger_accept_invalid_certs(true);
        Ok(Transport {
            inner: builder.build()?,
        })
    }

    /// Perform one request and read the whole response body.
    pub async fn send(&self, request: Request) -> Result<(Response, Log)> {
        debug!("Requesting {} {}", request.method, request.url);

        let mut builder = self
            .inner
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let res = builder.send().await?;
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = res.bytes().await?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        debug!("{} {} -> {status}", request.method, request.url);

        let log = Log {
            request: LogRequest {
                url: request.url,
                method: request.method,
                headers: request.headers,
                body: request
                    .body
                    .map(|body| String::from_utf8_lossy(&body).into_owned())
                    .unwrap_or_default(),
            },
            response: LogResponse {
                status,
                headers: headers.clone(),
                body: text.clone(),
            },
        };

        Ok((
            Response {
                status,
                headers,
                text,
            },
            log,
        ))
    }
}
