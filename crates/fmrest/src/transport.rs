use std::collections::BTreeMap;
use std::fmt;
use std::io::{Cursor, Read};
use std::sync::Arc;

use reqwest::blocking::multipart::{Form, Part};
use serde_json::Value;

use crate::config::{ServerConfig, TlsVerification};
use crate::error::{BoxError, Error, Result};

pub type TransportError = BoxError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    /// A single file part; the transport sets the multipart content type and boundary.
    Multipart {
        field: String,
        file_name: String,
        bytes: Vec<u8>,
    },
}

#[derive(Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    pub basic_auth: Option<(String, String)>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            query: Vec::new(),
            body: RequestBody::Empty,
            basic_auth: None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn json_body(&self) -> Option<&Value> {
        match &self.body {
            RequestBody::Json(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: BTreeMap<&str, &str> = self
            .headers
            .iter()
            .map(|(name, value)| {
                if name.eq_ignore_ascii_case("authorization") {
                    (name.as_str(), "<redacted>")
                } else {
                    (name.as_str(), value.as_str())
                }
            })
            .collect();
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &headers)
            .field("query", &self.query)
            .field("body", &self.body)
            .field(
                "basic_auth",
                &self.basic_auth.as_ref().map(|(user, _)| (user, "<redacted>")),
            )
            .finish()
    }
}

/// Response handed back by a [`Transport`]. Header names are lowercase.
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    body: Box<dyn Read + Send>,
}

impl HttpResponse {
    pub fn new(status: u16, headers: BTreeMap<String, String>, body: impl Read + Send + 'static) -> Self {
        Self {
            status,
            headers: headers
                .into_iter()
                .map(|(name, value)| (name.to_ascii_lowercase(), value))
                .collect(),
            body: Box::new(body),
        }
    }

    pub fn from_bytes(status: u16, headers: BTreeMap<String, String>, bytes: Vec<u8>) -> Self {
        Self::new(status, headers, Cursor::new(bytes))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")
            .and_then(|value| value.trim().parse().ok())
    }

    pub fn into_reader(self) -> Box<dyn Read + Send> {
        self.body
    }

    pub fn into_bytes(mut self) -> std::io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.body.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Reads the whole body and parses it as JSON.
    pub fn json(self) -> Result<Value> {
        let status = self.status;
        let content_type = self.content_type().map(str::to_string);
        let bytes = self.into_bytes()?;
        parse_json_body(status, content_type, &bytes)
    }
}

/// Parses a body that was already read, keeping status and content type for the error.
pub fn parse_json_body(status: u16, content_type: Option<String>, bytes: &[u8]) -> Result<Value> {
    serde_json::from_slice(bytes).map_err(|source| Error::BadJson {
        status,
        content_type,
        source,
    })
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Executes one HTTP exchange. Any network or protocol failure is an `Err`.
pub trait Transport: Send + Sync {
    fn execute(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}

impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    fn execute(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}

impl<T> Transport for Box<T>
where
    T: Transport + ?Sized,
{
    fn execute(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}

/// Blocking reqwest transport honoring the TLS, proxy and timeout settings of a [`ServerConfig`].
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        // Container downloads redirect through a URL that sets a session cookie.
        let mut builder = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .cookie_store(true);

        match &config.verify_ssl {
            TlsVerification::Enabled => {}
            TlsVerification::Disabled => {
                builder = builder.danger_accept_invalid_certs(true);
            }
            TlsVerification::CustomCa(path) => {
                let pem = std::fs::read(path)?;
                let certificate = reqwest::Certificate::from_pem(&pem).map_err(|err| {
                    Error::InvalidConfiguration(format!(
                        "invalid CA certificate {}: {err}",
                        path.display()
                    ))
                })?;
                builder = builder.add_root_certificate(certificate);
            }
        }

        for (scheme, proxy_url) in &config.proxies {
            let proxy = match scheme.as_str() {
                "http" => reqwest::Proxy::http(proxy_url),
                "https" => reqwest::Proxy::https(proxy_url),
                _ => reqwest::Proxy::all(proxy_url),
            }
            .map_err(|err| {
                Error::InvalidConfiguration(format!("invalid proxy for {scheme}: {err}"))
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|err| Error::InvalidConfiguration(format!("http client setup failed: {err}")))?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some((user, password)) = &request.basic_auth {
            builder = builder.basic_auth(user, Some(password));
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.body(serde_json::to_vec(&value)?),
            RequestBody::Multipart {
                field,
                file_name,
                bytes,
            } => builder.multipart(Form::new().part(field, Part::bytes(bytes).file_name(file_name))),
        };

        let response = builder.send()?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        Ok(HttpResponse::new(status, headers, response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_invalid_body_expected_bad_json_with_status_and_content_type() {
        let response = HttpResponse::from_bytes(
            502,
            BTreeMap::from([("Content-Type".to_string(), "text/html".to_string())]),
            b"<html>bad gateway</html>".to_vec(),
        );
        let error = response.json().expect_err("html is not json");
        match error {
            Error::BadJson {
                status,
                content_type,
                ..
            } => {
                assert_eq!(status, 502);
                assert_eq!(content_type.as_deref(), Some("text/html"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn json_valid_body_expected_value() {
        let response = HttpResponse::from_bytes(200, BTreeMap::new(), br#"{"a": 1}"#.to_vec());
        assert_eq!(response.json().expect("valid json"), json!({"a": 1}));
    }

    #[test]
    fn header_lookup_expected_case_insensitive() {
        let response = HttpResponse::from_bytes(
            200,
            BTreeMap::from([("Content-Length".to_string(), "12".to_string())]),
            Vec::new(),
        );
        assert_eq!(response.content_length(), Some(12));
        assert_eq!(response.header("CONTENT-LENGTH"), Some("12"));
    }

    #[test]
    fn request_debug_expected_credentials_redacted() {
        let mut request = HttpRequest::new(Method::Post, "https://fms.example.com/x");
        request
            .headers
            .insert("Authorization".to_string(), "Bearer abc123".to_string());
        request.basic_auth = Some(("admin".to_string(), "hunter2".to_string()));

        let rendered = format!("{request:?}");
        assert!(!rendered.contains("abc123"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("admin"));
    }
}
