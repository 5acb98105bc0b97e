//! Shared test utilities: generators, scripted transports, stub endpoints.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use proptest::prelude::*;
use tokio::task::JoinHandle;

use crate::delivery::{Target, TargetRole, Transport};
use crate::types::{PaymentId, QueueItem};

pub fn arb_payment_id() -> impl Strategy<Value = PaymentId> {
    "[a-zA-Z0-9][a-zA-Z0-9_-]{0,35}".prop_map(|s| PaymentId::parse(s).unwrap())
}

pub fn arb_amount() -> impl Strategy<Value = String> {
    "[0-9]{1,6}\\.[0-9]{2}".prop_map(String::from)
}

/// Raw intake payload for an id and amount.
pub fn payload(id: &str, amount: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({ "id": id, "amount": amount })).unwrap()
}

/// A transport that answers from per-target scripts.
///
/// Each role pops its next scripted answer; once a script runs out, the
/// role's default answer is used. Every call is recorded.
#[derive(Debug)]
pub struct ScriptedTransport {
    primary: Mutex<VecDeque<bool>>,
    fallback: Mutex<VecDeque<bool>>,
    primary_default: bool,
    fallback_default: bool,
    log: Mutex<Vec<(TargetRole, PaymentId, tokio::time::Instant)>>,
}

impl ScriptedTransport {
    pub fn always(primary_ok: bool, fallback_ok: bool) -> Self {
        Self::with_defaults(Vec::new(), Vec::new(), primary_ok, fallback_ok)
    }

    /// Scripted answers, then failure forever.
    pub fn scripted(primary: Vec<bool>, fallback: Vec<bool>) -> Self {
        Self::with_defaults(primary, fallback, false, false)
    }

    pub fn with_defaults(
        primary: Vec<bool>,
        fallback: Vec<bool>,
        primary_default: bool,
        fallback_default: bool,
    ) -> Self {
        ScriptedTransport {
            primary: Mutex::new(primary.into()),
            fallback: Mutex::new(fallback.into()),
            primary_default,
            fallback_default,
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    pub fn roles(&self) -> Vec<TargetRole> {
        self.log.lock().unwrap().iter().map(|(r, _, _)| *r).collect()
    }

    pub fn calls_for(&self, id: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, item, _)| item.as_str() == id)
            .count()
    }

    pub fn primary_call_times(&self) -> Vec<tokio::time::Instant> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _, _)| *r == TargetRole::Primary)
            .map(|(_, _, t)| *t)
            .collect()
    }
}

impl Transport for ScriptedTransport {
    async fn send(&self, target: &Target, item: &QueueItem) -> bool {
        self.log
            .lock()
            .unwrap()
            .push((target.role, item.id.clone(), tokio::time::Instant::now()));

        let (script, default) = match target.role {
            TargetRole::Primary => (&self.primary, self.primary_default),
            TargetRole::Fallback => (&self.fallback, self.fallback_default),
        };
        script.lock().unwrap().pop_front().unwrap_or(default)
    }
}

/// A local HTTP endpoint answering payment POSTs with scripted statuses.
///
/// The last status in the script repeats once the others are used up.
pub struct StubEndpoint {
    addr: SocketAddr,
    state: Arc<StubState>,
    server: JoinHandle<()>,
}

struct StubState {
    statuses: Mutex<VecDeque<StatusCode>>,
    bodies: Mutex<Vec<String>>,
    delay: Duration,
}

impl StubEndpoint {
    pub async fn start(statuses: Vec<StatusCode>) -> Self {
        Self::start_with_delay(statuses, Duration::ZERO).await
    }

    pub async fn start_with_delay(statuses: Vec<StatusCode>, delay: Duration) -> Self {
        let state = Arc::new(StubState {
            statuses: Mutex::new(statuses.into()),
            bodies: Mutex::new(Vec::new()),
            delay,
        });

        let app = Router::new()
            .route("/payments", post(stub_handler))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        StubEndpoint {
            addr,
            state,
            server,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/payments", self.addr)
    }

    pub fn bodies(&self) -> Vec<String> {
        self.state.bodies.lock().unwrap().clone()
    }

    pub fn hits(&self) -> usize {
        self.state.bodies.lock().unwrap().len()
    }
}

impl Drop for StubEndpoint {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn stub_handler(State(state): State<Arc<StubState>>, body: String) -> StatusCode {
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    state.bodies.lock().unwrap().push(body);

    let mut statuses = state.statuses.lock().unwrap();
    if statuses.len() > 1 {
        statuses.pop_front().unwrap_or(StatusCode::OK)
    } else {
        statuses.front().copied().unwrap_or(StatusCode::OK)
    }
}
