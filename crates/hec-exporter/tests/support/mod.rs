#![allow(dead_code)]

use std::collections::VecDeque;
use std::convert::Infallible;
use std::io::Read;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use flate2::read::GzDecoder;
use hec_exporter::{Config, HecEvent};
use http_body_util::{BodyExt, Full};
use hyper::header::HeaderMap;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use tokio::net::TcpListener;
use tokio::sync::{Notify, Semaphore};
use url::Url;

/// One request as seen by the mock endpoint.
#[derive(Debug, Clone)]
pub struct Received {
    pub method: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Received {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn is_gzip(&self) -> bool {
        self.header("content-encoding") == Some("gzip")
    }

    /// The uncompressed body.
    pub fn payload(&self) -> Vec<u8> {
        if self.is_gzip() {
            let mut out = Vec::new();
            GzDecoder::new(&self.body[..]).read_to_end(&mut out).unwrap();
            out
        } else {
            self.body.to_vec()
        }
    }

    pub fn events(&self) -> Vec<HecEvent> {
        hec_exporter::encode::decode_events(&self.payload()).unwrap()
    }
}

struct State {
    received: Mutex<Vec<Received>>,
    statuses: Mutex<VecDeque<StatusCode>>,
    gate: Option<Semaphore>,
    arrived: Notify,
}

/// In-process HEC endpoint recording every request.
///
/// Replies with scripted statuses in order, then 200. A gated endpoint holds
/// each response until [`MockHec::release`] is called.
pub struct MockHec {
    pub endpoint: Url,
    state: Arc<State>,
}

impl MockHec {
    pub async fn start() -> Self {
        Self::spawn(Vec::new(), false).await
    }

    pub async fn with_statuses(statuses: Vec<StatusCode>) -> Self {
        Self::spawn(statuses, false).await
    }

    pub async fn gated() -> Self {
        Self::spawn(Vec::new(), true).await
    }

    async fn spawn(statuses: Vec<StatusCode>, gated: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(State {
            received: Mutex::new(Vec::new()),
            statuses: Mutex::new(statuses.into()),
            gate: gated.then(|| Semaphore::new(0)),
            arrived: Notify::new(),
        });

        let server_state = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let state = Arc::clone(&server_state);
                tokio::spawn(async move {
                    let service = service_fn(move |req| handle(req, Arc::clone(&state)));
                    let _ = Builder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self {
            endpoint: Url::parse(&format!("http://127.0.0.1:{port}/services/collector")).unwrap(),
            state,
        }
    }

    pub fn config(&self) -> Config {
        install_crypto_provider();
        Config::new(self.endpoint.clone())
    }

    pub fn received(&self) -> Vec<Received> {
        self.state.received.lock().unwrap().clone()
    }

    /// Wait until a request has reached the endpoint.
    pub async fn arrived(&self) {
        self.state.arrived.notified().await;
    }

    /// Let `n` held responses go out.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.state.gate {
            gate.add_permits(n);
        }
    }
}

async fn handle<B>(req: Request<B>, state: Arc<State>) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
{
    let method = req.method().to_string();
    let headers = req.headers().clone();
    let body = req
        .collect()
        .await
        .map(|c| c.to_bytes())
        .unwrap_or_default();

    state.received.lock().unwrap().push(Received {
        method,
        headers,
        body,
    });
    state.arrived.notify_one();

    if let Some(gate) = &state.gate {
        gate.acquire().await.unwrap().forget();
    }

    let status = state
        .statuses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(StatusCode::OK);
    Ok(Response::builder()
        .status(status)
        .body(Full::new(Bytes::from_static(br#"{"text":"Success","code":0}"#)))
        .unwrap())
}

pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// A port nothing is listening on.
pub async fn closed_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// A string event whose encoded form, separator included, is exactly `len` bytes.
pub fn sized_event(len: usize) -> HecEvent {
    // {"event":"…"} plus "\r\n\r\n" is 16 bytes around the payload
    HecEvent::new("x".repeat(len - 16))
}

pub fn numbered_events(count: usize, len: usize) -> Vec<HecEvent> {
    (0..count)
        .map(|i| {
            let mut event = sized_event(len);
            if let serde_json::Value::String(s) = &mut event.event {
                let tag = format!("{i:06}");
                s.replace_range(..tag.len(), &tag);
            }
            event
        })
        .collect()
}
