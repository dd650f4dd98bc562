use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace};
use uuid::Uuid;

use echgo_common::{EchoError, ErrorResponse, Message, Result, ECHO_PATH};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Something that can carry one echo request to a server and report whether
/// it was answered.
///
/// The benchmark driver only ever needs this primitive, so tests can swap the
/// HTTP client for an in-memory stub.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: String) -> Result<()>;
}

/// Echo client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address as `host:port`.
    pub addr: String,
    /// Human-readable client name; the identity sent to the server is derived from it.
    pub name: String,
    /// Per-request timeout applied once connected.
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(addr: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            name: name.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Build a client identity from `name` and a random v4 UUID fragment, e.g.
/// `bench-host-1F3A9C02`.
///
/// Independent processes started at the same moment still get distinct
/// identities because the suffix does not depend on a process-local seed.
pub fn make_identity(name: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", name, suffix[..8].to_uppercase())
}

/// HTTP echo client
pub struct Client {
    pub config: ClientConfig,
    identity: String,
    http_client: Option<reqwest::Client>,
    n_sent: AtomicU64,
    n_recv: AtomicU64,
}

impl Client {
    /// Create a new, not yet connected client with the given configuration
    pub fn new(config: ClientConfig) -> Self {
        let identity = make_identity(&config.name);
        Self {
            config,
            identity,
            http_client: None,
            n_sent: AtomicU64::new(0),
            n_recv: AtomicU64::new(0),
        }
    }

    /// Identity this client reports as the sender of every message.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Build the URL of the echo endpoint on the configured server.
    pub fn build_echo_url(&self) -> String {
        format!("http://{}{}", self.config.addr, ECHO_PATH)
    }

    /// Prepare the HTTP connection pool, applying the configured timeout.
    pub fn connect(&mut self) -> Result<()> {
        let http_client = reqwest::Client::builder()
            .timeout(self.config.timeout)
            .build()
            .map_err(|e| {
                let addr = &self.config.addr;
                EchoError::NetworkError(format!("could not connect to '{addr}': {e}"))
            })?;
        self.http_client = Some(http_client);
        debug!(addr = %self.config.addr, identity = %self.identity, "client connected");
        Ok(())
    }

    /// Drop the connection pool; safe to call when not connected.
    pub fn close(&mut self) {
        if self.http_client.take().is_some() {
            debug!(addr = %self.config.addr, "client closed");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.http_client.is_some()
    }

    /// Number of messages handed to the server.
    pub fn sent(&self) -> u64 {
        self.n_sent.load(Ordering::Relaxed)
    }

    /// Number of replies received.
    pub fn received(&self) -> u64 {
        self.n_recv.load(Ordering::Relaxed)
    }

    /// Send one message and wait for the server's reply.
    pub async fn send_message(&self, message: &str) -> Result<Message> {
        let http_client = self
            .http_client
            .as_ref()
            .ok_or_else(|| EchoError::NotConnected(self.config.addr.clone()))?;

        let request = Message {
            sender: self.identity.clone(),
            message: message.to_string(),
        };

        self.n_sent.fetch_add(1, Ordering::Relaxed);
        let response = http_client
            .post(self.build_echo_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| EchoError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(parse_error_response(status, response).await);
        }

        let reply = response
            .json::<Message>()
            .await
            .map_err(|e| EchoError::NetworkError(e.to_string()))?;

        self.n_recv.fetch_add(1, Ordering::Relaxed);
        trace!(sender = %reply.sender, message = %reply.message, "received");
        Ok(reply)
    }
}

#[async_trait]
impl Transport for Client {
    async fn send(&self, message: String) -> Result<()> {
        self.send_message(&message).await.map(|_| ())
    }
}

async fn parse_error_response(
    status: reqwest::StatusCode,
    response: reqwest::Response,
) -> EchoError {
    let error_msg = response
        .json::<ErrorResponse>()
        .await
        .map(|r| r.error)
        .unwrap_or_else(|_| format!("Server returned status: {}", status));

    EchoError::HttpError(status.as_u16(), error_msg)
}
