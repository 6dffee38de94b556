//! Cold-start-aware chat completion client.
//!
//! The backend runs on free-tier hosting and sleeps when idle, so the first
//! request of a process can legitimately take tens of seconds. The client
//! applies an asymmetric deadline: long while the backend has never been
//! observed responsive ("cold"), short afterwards ("warm"). Warm is sticky
//! for the process lifetime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use synapse_common::AuthSession;

use crate::{classify_status, ChatReply, ChatTransport, RequestError};

/// Configuration for reaching the Synapse backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Backend origin, e.g. `https://synapse-api.onrender.com`.
    pub base_url: String,
    /// Deadline once the backend has answered at least once.
    pub warm_timeout: Duration,
    /// Deadline while the backend may still be cold-starting.
    pub cold_timeout: Duration,
    /// Deadline for a single health probe.
    pub probe_timeout: Duration,
    /// Pause between probes in [`ChatClient::probe_until_ready`].
    pub probe_retry: Duration,
    /// How long a warm request may run before the caller is told the
    /// backend looks slow.
    pub warm_grace: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            warm_timeout: Duration::from_secs(60),
            cold_timeout: Duration::from_secs(120),
            probe_timeout: Duration::from_secs(10),
            probe_retry: Duration::from_secs(5),
            warm_grace: Duration::from_secs(10),
        }
    }
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_warm_timeout(mut self, timeout: Duration) -> Self {
        self.warm_timeout = timeout;
        self
    }

    pub fn with_cold_timeout(mut self, timeout: Duration) -> Self {
        self.cold_timeout = timeout;
        self
    }

    pub fn with_warm_grace(mut self, grace: Duration) -> Self {
        self.warm_grace = grace;
        self
    }
}

/// Progressive status of one chat exchange, surfaced to the UI layer.
#[derive(Debug, Clone)]
pub enum ExchangePhase {
    Sent,
    WarmingUp,
    Succeeded,
    Failed(RequestError),
}

/// HTTP implementation of [`ChatTransport`] against the Synapse backend.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    auth: AuthSession,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, auth: AuthSession) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            auth,
        }
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn execute(&self, message: &str) -> Result<ChatReply, RequestError> {
        let body = serde_json::json!({ "message": message });

        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .header(reqwest::header::AUTHORIZATION, self.auth.bearer())
            .json(&body)
            .send()
            .await
            .map_err(RequestError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, text));
        }

        response
            .json::<ChatReply>()
            .await
            .map_err(|e| RequestError::Parse(e.to_string()))
    }

    async fn probe(&self) -> Result<(), RequestError> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(RequestError::from_reqwest)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(classify_status(status, text))
        }
    }
}

/// Chat client with adaptive deadlines and progressive status reporting.
///
/// Performs exactly one attempt per call; retrying is the caller's choice.
pub struct ChatClient {
    config: BackendConfig,
    transport: Box<dyn ChatTransport>,
    warm: AtomicBool,
}

impl ChatClient {
    pub fn new(config: BackendConfig, auth: AuthSession) -> Self {
        let transport = HttpTransport::new(config.base_url.clone(), auth);
        Self::with_transport(config, Box::new(transport))
    }

    /// Build over a custom transport (used by tests and alternative stacks).
    pub fn with_transport(config: BackendConfig, transport: Box<dyn ChatTransport>) -> Self {
        Self {
            config,
            transport,
            warm: AtomicBool::new(false),
        }
    }

    /// Whether the backend has been observed responsive in this process.
    pub fn is_warm(&self) -> bool {
        self.warm.load(Ordering::Relaxed)
    }

    /// The deadline the next request will run under.
    pub fn current_timeout(&self) -> Duration {
        if self.is_warm() {
            self.config.warm_timeout
        } else {
            self.config.cold_timeout
        }
    }

    fn mark_warm(&self) {
        if !self.warm.swap(true, Ordering::Relaxed) {
            info!("backend observed responsive, switching to warm deadline");
        }
    }

    /// One health probe under [`BackendConfig::probe_timeout`]. Success
    /// marks the backend warm.
    pub async fn probe_health(&self) -> Result<(), RequestError> {
        match tokio::time::timeout(self.config.probe_timeout, self.transport.probe()).await {
            Ok(Ok(())) => {
                self.mark_warm();
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => Err(RequestError::Timeout),
        }
    }

    /// Probe until the backend answers, pausing `probe_retry` between
    /// attempts. An auth failure stops the loop immediately; everything
    /// else is treated as "still waking up".
    pub async fn probe_until_ready(&self) -> Result<(), RequestError> {
        loop {
            match self.probe_health().await {
                Ok(()) => return Ok(()),
                Err(RequestError::AuthExpired) => return Err(RequestError::AuthExpired),
                Err(e) => {
                    debug!(error = %e, "backend not ready yet");
                }
            }
            tokio::time::sleep(self.config.probe_retry).await;
        }
    }

    /// Send one chat message under the adaptive deadline.
    pub async fn send(&self, message: &str) -> Result<ChatReply, RequestError> {
        self.send_with_status(message, Box::new(|_| {})).await
    }

    /// Send one chat message, reporting [`ExchangePhase`] transitions.
    ///
    /// When cold, `WarmingUp` is reported immediately; when warm, only
    /// after `warm_grace` elapses without a response.
    pub async fn send_with_status(
        &self,
        message: &str,
        on_phase: Box<dyn Fn(ExchangePhase) + Send + Sync>,
    ) -> Result<ChatReply, RequestError> {
        let deadline = self.current_timeout();
        let mut warming = !self.is_warm();

        on_phase(ExchangePhase::Sent);
        if warming {
            on_phase(ExchangePhase::WarmingUp);
        }
        debug!(
            deadline_secs = deadline.as_secs(),
            cold = warming,
            "chat request dispatched"
        );

        let fut = tokio::time::timeout(deadline, self.transport.execute(message));
        tokio::pin!(fut);

        let outcome = loop {
            if warming {
                break (&mut fut).await;
            }
            tokio::select! {
                res = &mut fut => break res,
                _ = tokio::time::sleep(self.config.warm_grace) => {
                    warming = true;
                    on_phase(ExchangePhase::WarmingUp);
                }
            }
        };

        match outcome {
            Ok(Ok(reply)) => {
                self.mark_warm();
                on_phase(ExchangePhase::Succeeded);
                Ok(reply)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "chat request failed");
                on_phase(ExchangePhase::Failed(e.clone()));
                Err(e)
            }
            Err(_elapsed) => {
                warn!(
                    deadline_secs = deadline.as_secs(),
                    "chat request exceeded deadline"
                );
                let e = RequestError::Timeout;
                on_phase(ExchangePhase::Failed(e.clone()));
                Err(e)
            }
        }
    }
}
