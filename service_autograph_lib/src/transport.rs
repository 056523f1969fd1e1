//! Types shared with the HTTP transport that executes generated requests.
//!
//! Nothing here talks to the network. A transport implementation lives
//! outside this crate and plugs in through [HttpTransport].

use std::collections::BTreeMap;
use std::error;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use simple_error::SimpleError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}
impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}
impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a [RequestParameters] bucket is put on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ParameterEncoding {
    Json,
    Url,
    PropertyList,
}

/// One bucket of named request parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestParameters {
    pub encoding: ParameterEncoding,
    pub parameters: BTreeMap<String, Value>,
}
impl RequestParameters {
    pub fn new(encoding: ParameterEncoding) -> Self {
        RequestParameters {
            encoding,
            parameters: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.parameters.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

pub trait HttpRequestInterceptor: Send + Sync {
    fn intercept_request(&self, request: HttpRequest) -> HttpRequest;
}

pub trait HttpResponseInterceptor: Send + Sync {
    fn intercept_response(&self, response: HttpResponse) -> HttpResponse;
}

/// A request as assembled by a generated service method.
///
/// `base` carries the service-wide defaults (base URL, default headers,
/// global interceptors). Merging the two is up to the transport.
#[derive(Clone)]
pub struct HttpRequest {
    pub http_method: HttpMethod,
    pub endpoint: String,
    pub headers: Vec<(String, String)>,
    pub parameters: Vec<RequestParameters>,
    pub request_interceptors: Vec<Arc<dyn HttpRequestInterceptor>>,
    pub response_interceptors: Vec<Arc<dyn HttpResponseInterceptor>>,
    pub base: Option<Box<HttpRequest>>,
}
impl HttpRequest {
    pub fn new(http_method: HttpMethod, endpoint: impl Into<String>) -> Self {
        HttpRequest {
            http_method,
            endpoint: endpoint.into(),
            headers: Vec::new(),
            parameters: Vec::new(),
            request_interceptors: Vec::new(),
            response_interceptors: Vec::new(),
            base: None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header_name, _)| header_name.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The first parameter bucket with the given encoding.
    pub fn parameters(&self, encoding: ParameterEncoding) -> Option<&RequestParameters> {
        self.parameters.iter().find(|x| x.encoding == encoding)
    }
}
impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("http_method", &self.http_method)
            .field("endpoint", &self.endpoint)
            .field("headers", &self.headers)
            .field("parameters", &self.parameters)
            .field("request_interceptors", &self.request_interceptors.len())
            .field("response_interceptors", &self.response_interceptors.len())
            .field("base", &self.base)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}
impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }
}

/// Failure reported by the transport. Cheap to clone so call results can be
/// memoized and handed out more than once.
#[derive(Clone)]
pub struct TransportError {
    inner: Arc<dyn error::Error + Send + Sync>,
}
impl TransportError {
    pub fn new(e: impl Into<Box<dyn error::Error + Send + Sync>>) -> Self {
        TransportError {
            inner: Arc::from(e.into()),
        }
    }

    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(SimpleError::new(message.into()))
    }
}
impl fmt::Debug for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TransportError").field(&self.inner).finish()
    }
}
impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}
impl error::Error for TransportError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&*self.inner)
    }
}

pub type TransportResult = Result<HttpResponse, TransportError>;

pub type TransportCallback = Box<dyn FnOnce(TransportResult) + Send>;

/// Handle to an in-flight asynchronous request.
pub trait HttpCall: Send {
    fn cancel(&self);
}

pub trait HttpTransport: Send + Sync {
    /// Performs the request on the calling thread.
    fn send(&self, request: &HttpRequest) -> TransportResult;

    /// Starts the request and reports the outcome through `callback`.
    fn send_with_callback(&self, request: HttpRequest, callback: TransportCallback)
        -> Box<dyn HttpCall>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_ignores_case() {
        let mut request = HttpRequest::new(HttpMethod::Get, "/");
        request
            .headers
            .push(("X-Auth-Header".to_string(), "secret".to_string()));
        assert_eq!(request.header("x-auth-header"), Some("secret"));
        assert_eq!(request.header("missing"), None);
    }

    #[test]
    fn test_transport_error_message() {
        let error = TransportError::msg("connection reset");
        assert_eq!(error.to_string(), "connection reset");
        assert!(error::Error::source(&error).is_some());
    }
}
