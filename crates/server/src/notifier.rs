use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use procura_core::config::NotificationConfig;
use procura_core::notifications::{DispatchError, LogNotifier, Notice, Notifier};

/// Posts each notice as JSON to an HTTP mail gateway.
pub struct WebhookNotifier {
    client: Client,
    gateway_url: String,
    api_token: Option<SecretString>,
    sender: String,
}

#[derive(Debug, Serialize)]
struct GatewayMessage<'a> {
    to: &'a str,
    from: &'a str,
    subject: &'a str,
    body: &'a str,
}

impl WebhookNotifier {
    pub fn new(
        gateway_url: impl Into<String>,
        api_token: Option<SecretString>,
        sender: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, gateway_url: gateway_url.into(), api_token, sender: sender.into() })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notice: &Notice) -> Result<(), DispatchError> {
        let message = GatewayMessage {
            to: &notice.recipient,
            from: &self.sender,
            subject: &notice.subject,
            body: &notice.body,
        };

        let mut request = self.client.post(&self.gateway_url).json(&message);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response =
            request.send().await.map_err(|error| DispatchError::Transport(error.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(DispatchError::Auth(format!(
                "gateway answered {}",
                response.status()
            ))),
            status => Err(DispatchError::Rejected { status: status.as_u16() }),
        }
    }
}

/// Picks the delivery transport: the HTTP gateway when one is configured, the log otherwise.
pub fn build_notifier(config: &NotificationConfig) -> Result<Arc<dyn Notifier>, reqwest::Error> {
    match &config.gateway_url {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(
            url.clone(),
            config.api_token.clone(),
            config.sender_address.clone(),
            Duration::from_secs(config.timeout_secs),
        )?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}
