//! Webhook-based `ChatTransport` implementation.

use super::{ChatPayload, ChatTransport};
use crate::error::NotifierError;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct WebhookBody<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    embeds: Option<Vec<WebhookEmbed<'a>>>,
}

#[derive(Debug, Serialize)]
struct WebhookEmbed<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

pub struct WebhookTransport {
    http: reqwest::Client,
    webhook_url: String,
    timeout: Duration,
}

impl WebhookTransport {
    pub fn new(webhook_url: String, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            webhook_url,
            timeout,
        }
    }
}

#[async_trait]
impl ChatTransport for WebhookTransport {
    async fn send_message(&self, payload: ChatPayload) -> Result<(), NotifierError> {
        let _timer = crate::telemetry::DispatchTimer::new(self.webhook_url.clone());

        let embeds = if payload.embed_title.is_some() || payload.embed_description.is_some() {
            Some(vec![WebhookEmbed {
                title: payload.embed_title.as_deref(),
                description: payload.embed_description.as_deref(),
            }])
        } else {
            None
        };
        let body = WebhookBody {
            content: &payload.body,
            embeds,
        };

        let response = self
            .http
            .post(&self.webhook_url)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifierError::Timeout(self.timeout)
                } else {
                    NotifierError::Dispatch(e.to_string())
                }
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(NotifierError::Dispatch(format!("status {}", response.status())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_body_omits_embeds_when_absent() {
        let body = WebhookBody {
            content: "hi",
            embeds: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("embeds"));
    }
}
