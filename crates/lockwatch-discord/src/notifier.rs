//! `Notifier` implementation backed by the Discord REST API.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use lockwatch_core::{
    ActionEvent, ActuationReport, AlertEntry, MessageHandle, Notifier, NotifierError,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::gateway::Gateway;
use crate::render;
use crate::rest::{ClientBuildError, DiscordConfig, RestClient};

/// Channel types a bot can post alerts into.
const TEXT_CHANNEL_TYPES: [u8; 2] = [0, 5];

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: String,
    channel_id: String,
}

#[derive(Debug, Deserialize)]
struct ChannelInfo {
    #[serde(rename = "type")]
    kind: u8,
    name: Option<String>,
}

/// Posts alerts and reports to one Discord channel.
#[derive(Clone)]
pub struct DiscordNotifier {
    rest: RestClient,
    config: DiscordConfig,
    application_id: Arc<OnceLock<String>>,
}

impl DiscordNotifier {
    pub fn new(config: DiscordConfig) -> Result<Self, ClientBuildError> {
        let rest = RestClient::new(&config)?;
        Ok(Self {
            rest,
            config,
            application_id: Arc::new(OnceLock::new()),
        })
    }

    /// Creates the gateway listener that feeds this notifier's clicks.
    ///
    /// The two share the application id learned at `READY`.
    pub fn gateway(&self) -> Gateway {
        Gateway::new(
            self.rest.clone(),
            self.config.bot_token.clone(),
            Arc::clone(&self.application_id),
        )
    }

    /// Application id, once the gateway has reported it.
    pub fn application_id(&self) -> Option<&str> {
        self.application_id.get().map(String::as_str)
    }

    /// Checks that the destination channel exists and accepts messages.
    pub async fn verify_channel(&self) -> Result<(), NotifierError> {
        let info: ChannelInfo = self
            .rest
            .get(&format!("/channels/{}", self.config.channel_id))
            .await?;

        if !TEXT_CHANNEL_TYPES.contains(&info.kind) {
            return Err(NotifierError::InvalidResponse(format!(
                "channel {} is not a text channel (type {})",
                self.config.channel_id, info.kind
            )));
        }

        info!(
            channel_id = self.config.channel_id,
            channel = info.name.as_deref().unwrap_or("?"),
            "Discord channel verified"
        );
        Ok(())
    }

    async fn send_followup(
        &self,
        event: &ActionEvent,
        report: &ActuationReport,
    ) -> Result<(), NotifierError> {
        let body = render::followup_message(report);

        match (self.application_id.get(), event.reply_token.as_deref()) {
            (Some(app_id), Some(token)) => {
                self.rest
                    .post_empty(&format!("/webhooks/{app_id}/{token}"), &body)
                    .await
            }
            _ => {
                debug!(
                    correlation_id = %event.correlation_id,
                    "No interaction token; posting report to the channel"
                );
                let body = json!({ "content": body["content"] });
                self.rest
                    .post_empty(&format!("/channels/{}/messages", event.message.channel_id), &body)
                    .await
            }
        }
    }

    async fn disable_button(&self, message: &MessageHandle) {
        let body = json!({ "components": render::lock_all_components(true) });
        let path = format!(
            "/channels/{}/messages/{}",
            message.channel_id, message.message_id
        );

        match self.rest.patch(&path, &body).await {
            Ok(()) => debug!(message = %message, "Alert button disabled"),
            Err(NotifierError::Unavailable(reason)) if reason.starts_with("HTTP 404") => {
                warn!(message = %message, "Alert message no longer exists");
            }
            Err(NotifierError::Unavailable(reason)) if reason.starts_with("HTTP 403") => {
                error!(message = %message, "Missing permission to edit the alert message");
            }
            Err(e) => warn!(message = %message, error = %e, "Failed to disable alert button"),
        }
    }
}

impl std::fmt::Debug for DiscordNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordNotifier")
            .field("config", &self.config)
            .field("application_id", &self.application_id.get())
            .finish()
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn send_alert(
        &self,
        entries: &[AlertEntry],
        mention: Option<&str>,
    ) -> Result<MessageHandle, NotifierError> {
        let body = render::alert_message(entries, mention);
        let created: CreatedMessage = self
            .rest
            .post(&format!("/channels/{}/messages", self.config.channel_id), &body)
            .await?;

        Ok(MessageHandle {
            channel_id: created.channel_id,
            message_id: created.id,
        })
    }

    async fn report_result(
        &self,
        event: &ActionEvent,
        report: &ActuationReport,
    ) -> Result<(), NotifierError> {
        let followup = self.send_followup(event, report).await;
        self.disable_button(&event.message).await;
        followup
    }
}
