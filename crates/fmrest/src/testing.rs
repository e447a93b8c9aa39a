use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Read};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Value, json};

use crate::api::{CONTENT_TYPE_JSON, codes};
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};

/// Wraps `response` in a Data API envelope whose first message carries `code`.
pub fn envelope(code: i64, response: Value) -> Value {
    let message = if code == codes::SUCCESS { "OK" } else { "Error" };
    json!({
        "messages": [{"code": code.to_string(), "message": message}],
        "response": response
    })
}

#[derive(Clone, Debug)]
enum Scripted {
    Response {
        status: u16,
        headers: BTreeMap<String, String>,
        body: Vec<u8>,
    },
    Failure(String),
    BrokenBody {
        status: u16,
        message: String,
    },
}

/// Body reader that fails on first read, like a connection reset mid-transfer.
struct BrokenReader(String);

impl Read for BrokenReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::ConnectionReset, self.0.clone()))
    }
}

#[derive(Debug, Default)]
struct MockTransportState {
    scripted: VecDeque<Scripted>,
    requests: Vec<HttpRequest>,
}

/// In-memory transport answering with scripted responses in FIFO order.
///
/// Every executed request is recorded. Clones share the same script and log,
/// so a test can keep a handle after moving one into a [`crate::Server`].
#[derive(Clone, Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockTransportState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_response(&self, status: u16, content_type: Option<&str>, body: impl Into<Vec<u8>>) {
        let headers = content_type
            .map(|value| BTreeMap::from([("content-type".to_string(), value.to_string())]))
            .unwrap_or_default();
        self.state().scripted.push_back(Scripted::Response {
            status,
            headers,
            body: body.into(),
        });
    }

    pub fn push_json(&self, status: u16, body: Value) {
        self.push_response(status, Some(CONTENT_TYPE_JSON), body.to_string());
    }

    /// Queues a Data API envelope; non-zero codes are answered with HTTP 500 like the server does.
    pub fn push_envelope(&self, code: i64, response: Value) {
        let status = if code == codes::SUCCESS { 200 } else { 500 };
        self.push_json(status, envelope(code, response));
    }

    /// Queues a transport-level failure (connection refused, timeout, ...).
    pub fn push_failure(&self, message: impl Into<String>) {
        self.state()
            .scripted
            .push_back(Scripted::Failure(message.into()));
    }

    /// Queues a response whose headers arrive but whose body fails to read.
    pub fn push_broken_body(&self, status: u16, message: impl Into<String>) {
        self.state().scripted.push_back(Scripted::BrokenBody {
            status,
            message: message.into(),
        });
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.state().requests.len()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.state().requests.last().cloned()
    }

    /// Scripted responses not consumed yet.
    pub fn pending(&self) -> usize {
        self.state().scripted.len()
    }
}

impl Transport for MockTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| "mock transport state poisoned")?;
        let url = request.url.clone();
        state.requests.push(request);
        match state.scripted.pop_front() {
            Some(Scripted::Response {
                status,
                headers,
                body,
            }) => Ok(HttpResponse::from_bytes(status, headers, body)),
            Some(Scripted::Failure(message)) => Err(message.into()),
            Some(Scripted::BrokenBody { status, message }) => {
                let headers =
                    BTreeMap::from([("content-type".to_string(), CONTENT_TYPE_JSON.to_string())]);
                Ok(HttpResponse::new(status, headers, BrokenReader(message)))
            }
            None => Err(format!("no scripted response left for {url}").into()),
        }
    }
}
