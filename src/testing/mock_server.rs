//! An in-process, axum-based mock chat-completions endpoint used to drive
//! the real HTTP transport path end to end in tests, rather than mocking
//! it away behind a trait.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::transport::ChatTransport;

#[derive(Clone)]
struct AppState {
    responses: Arc<Mutex<VecDeque<String>>>,
    request_log: Arc<Mutex<Vec<Value>>>,
}

/// A queued-response chat endpoint bound to a random local port. Returns
/// each configured reply in order; once exhausted, returns an empty
/// completion rather than erroring, so tests can assert on the empty reply
/// directly if that's useful.
#[allow(dead_code)]
pub struct MockBackend {
    addr: std::net::SocketAddr,
    request_log: Arc<Mutex<Vec<Value>>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockBackend {
    pub fn new(replies: &[&str]) -> Self {
        let responses = Arc::new(Mutex::new(
            replies.iter().map(|s| s.to_string()).collect::<VecDeque<_>>(),
        ));
        let request_log = Arc::new(Mutex::new(Vec::new()));

        let std_listener = std::net::TcpListener::bind("127.0.0.1:0")
            .expect("binding an ephemeral local port should not fail");
        std_listener
            .set_nonblocking(true)
            .expect("setting nonblocking should not fail");
        let addr = std_listener
            .local_addr()
            .expect("a bound listener has a local address");
        let listener =
            TcpListener::from_std(std_listener).expect("converting to a tokio listener should not fail");

        let state = AppState {
            responses,
            request_log: request_log.clone(),
        };
        let app = Router::new()
            .route("/chat/completions", post(handle_chat))
            .with_state(state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("mock backend server should not fail to serve");
        });

        Self {
            addr,
            request_log,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn api_base(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn transport(&self) -> ChatTransport {
        ChatTransport::new()
    }

    pub fn request_count(&self) -> usize {
        self.request_log.lock().expect("request log mutex poisoned").len()
    }
}

async fn handle_chat(State(state): State<AppState>, Json(body): Json<Value>) -> Json<Value> {
    state
        .request_log
        .lock()
        .expect("request log mutex poisoned")
        .push(body);
    let content = state
        .responses
        .lock()
        .expect("responses mutex poisoned")
        .pop_front()
        .unwrap_or_default();
    Json(json!({ "choices": [{ "message": { "content": content } }] }))
}
