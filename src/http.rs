// HTTP transport seam.
//
// Everything that talks to the network goes through the `Transport` trait
// so the OAuth refresh decorator and the file operations can run against a
// scripted fake in tests. `HttpTransport` is the real, blocking
// implementation on top of reqwest.

use crate::error::TransportError;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use std::io::{Cursor, Read};
use tracing::debug;
use url::Url;

/// Sends one request and returns the response, whatever its status.
pub trait Transport {
    fn send(&self, request: Request) -> Result<Response, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: Request) -> Result<Response, TransportError> {
        (**self).send(request)
    }
}

/// Request payload.
pub enum Body {
    Empty,
    /// `application/x-www-form-urlencoded` pairs.
    Form(Vec<(String, String)>),
    Bytes {
        content_type: String,
        data: Vec<u8>,
    },
    /// Streamed once from `reader`; a request with this body cannot be
    /// replayed.
    Stream {
        content_type: String,
        reader: Box<dyn Read + Send>,
        len: u64,
    },
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => f.write_str("Empty"),
            Body::Form(pairs) => f.debug_tuple("Form").field(&pairs.len()).finish(),
            Body::Bytes { content_type, data } => f
                .debug_struct("Bytes")
                .field("content_type", content_type)
                .field("len", &data.len())
                .finish(),
            Body::Stream {
                content_type, len, ..
            } => f
                .debug_struct("Stream")
                .field("content_type", content_type)
                .field("len", len)
                .finish(),
        }
    }
}

#[derive(Debug)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Body,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Request {
            method,
            url,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    /// Copy of this request for replaying, unless the body is a stream.
    pub fn try_clone(&self) -> Option<Request> {
        let body = match &self.body {
            Body::Empty => Body::Empty,
            Body::Form(pairs) => Body::Form(pairs.clone()),
            Body::Bytes { content_type, data } => Body::Bytes {
                content_type: content_type.clone(),
                data: data.clone(),
            },
            Body::Stream { .. } => return None,
        };
        Some(Request {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body,
        })
    }
}

/// Status plus a body that is read lazily.
pub struct Response {
    status: StatusCode,
    body: Box<dyn Read + Send>,
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response").field("status", &self.status).finish()
    }
}

/// Google APIs report failures as `{"error": {"code": .., "message": ..}}`,
/// the token endpoint as `{"error": "..", "error_description": ..}`.
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Api { message: String },
    Code(String),
}

impl Response {
    pub fn new(status: StatusCode, body: impl Read + Send + 'static) -> Self {
        Response {
            status,
            body: Box::new(body),
        }
    }

    /// Response with an in-memory body.
    pub fn from_bytes(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self::new(status, Cursor::new(body.into()))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn json<T: DeserializeOwned>(self) -> Result<T, TransportError> {
        serde_json::from_reader(self.body).map_err(TransportError::Decode)
    }

    pub fn text(mut self) -> Result<String, TransportError> {
        let mut text = String::new();
        self.body
            .read_to_string(&mut text)
            .map_err(TransportError::Body)?;
        Ok(text)
    }

    pub fn into_reader(self) -> Box<dyn Read + Send> {
        self.body
    }

    /// Turn a non-success status into `TransportError::Status`, using the
    /// API's error message when the body carries one.
    pub fn error_for_status(self) -> Result<Self, TransportError> {
        if self.status.is_success() {
            return Ok(self);
        }
        let status = self.status;
        let text = self.text().unwrap_or_default();
        Err(TransportError::Status {
            status,
            message: error_message(&text),
        })
    }
}

/// Best-effort human readable message from an error body.
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error: ErrorDetail::Api { message },
        }) => message,
        Ok(ErrorEnvelope {
            error: ErrorDetail::Code(code),
        }) => code,
        Err(_) => body.trim().to_string(),
    }
}

/// Blocking reqwest transport. No timeout is configured beyond reqwest's
/// defaults.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(HttpTransport { client })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: Request) -> Result<Response, TransportError> {
        let Request {
            method,
            url,
            headers,
            body,
        } = request;
        debug!(%method, %url, "sending request");

        let builder = self.client.request(method, url).headers(headers);
        let builder = match body {
            Body::Empty => builder,
            Body::Form(pairs) => builder.form(&pairs),
            Body::Bytes { content_type, data } => builder
                .header(CONTENT_TYPE, HeaderValue::from_str(&content_type)?)
                .body(data),
            Body::Stream {
                content_type,
                reader,
                len,
            } => builder
                .header(CONTENT_TYPE, HeaderValue::from_str(&content_type)?)
                .body(reqwest::blocking::Body::sized(reader, len)),
        };

        let response = builder.send()?;
        debug!(status = %response.status(), "received response");
        Ok(Response::new(response.status(), response))
    }
}
