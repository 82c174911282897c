//! Bridge between the session manager and a host-owned browser presenter
//!
//! [`ChannelBroker`] implements [`InteractiveAuthBroker`] by sending
//! [`BrowserRequest`]s over a channel to whatever UI layer owns the browser,
//! and awaiting the reply.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use url::Url;

use super::traits::InteractiveAuthBroker;

/// Browser broker failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// The user dismissed the browser session
    #[error("Browser session cancelled by user")]
    Cancelled,

    /// The browser session could not be started or failed
    #[error("Browser session failed: {0}")]
    Failed(String),
}

/// Why a browser session is being presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserPurpose {
    /// Login; present with an ephemeral session
    Authorize,
    /// RP-initiated logout
    EndSession,
}

/// Work item for the host's browser presenter
#[derive(Debug)]
pub enum BrowserRequest {
    /// Open `url` and reply with the callback URL once `callback_scheme` is
    /// navigated to
    Present {
        purpose: BrowserPurpose,
        url: Url,
        callback_scheme: String,
        respond: oneshot::Sender<Result<Url, BrokerError>>,
    },
    /// Remove cookies and site data for `host`
    ClearSiteData { host: String, respond: oneshot::Sender<Result<(), BrokerError>> },
}

/// Channel-backed [`InteractiveAuthBroker`]
#[derive(Debug, Clone)]
pub struct ChannelBroker {
    requests: mpsc::Sender<BrowserRequest>,
}

impl ChannelBroker {
    /// Create a broker and the receiving end the presenter drains
    #[must_use]
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<BrowserRequest>) {
        let (requests, receiver) = mpsc::channel(buffer.max(1));
        (Self { requests }, receiver)
    }

    async fn present(
        &self,
        purpose: BrowserPurpose,
        url: Url,
        callback_scheme: &str,
    ) -> Result<Url, BrokerError> {
        let (respond, reply) = oneshot::channel();
        let request = BrowserRequest::Present {
            purpose,
            url,
            callback_scheme: callback_scheme.to_string(),
            respond,
        };

        self.send(request).await?;
        reply.await.map_err(|_| BrokerError::Failed("browser presenter dropped the request".into()))?
    }

    async fn send(&self, request: BrowserRequest) -> Result<(), BrokerError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| BrokerError::Failed("no browser presenter attached".into()))
    }
}

#[async_trait]
impl InteractiveAuthBroker for ChannelBroker {
    async fn authorize(&self, url: Url, callback_scheme: &str) -> Result<Url, BrokerError> {
        debug!(callback_scheme, "Presenting authorization page");
        self.present(BrowserPurpose::Authorize, url, callback_scheme).await
    }

    async fn end_session(&self, url: Url, callback_scheme: &str) -> Result<(), BrokerError> {
        debug!(callback_scheme, "Presenting end-session page");
        self.present(BrowserPurpose::EndSession, url, callback_scheme).await.map(|_| ())
    }

    async fn clear_site_data(&self, host: &str) -> Result<(), BrokerError> {
        let (respond, reply) = oneshot::channel();
        self.send(BrowserRequest::ClearSiteData { host: host.to_string(), respond }).await?;
        reply.await.map_err(|_| BrokerError::Failed("browser presenter dropped the request".into()))?
    }
}
