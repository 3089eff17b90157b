//! Per-account support chat between a user and the admins.

use crate::core::store::{DocumentStore, StoreError, Subscription};
use crate::core::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

pub fn channel_path(account_id: &str) -> String {
    format!("chats/user_{account_id}")
}

pub fn messages_path(account_id: &str) -> String {
    format!("{}/messages", channel_path(account_id))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(skip)]
    pub id: String,
    pub text: String,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// True when sent by someone other than the channel owner.
    pub fn is_from_support(&self, account_id: &str) -> bool {
        self.sender_id != account_id
    }
}

/// Summary of one account's channel, as listed for admins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSummary {
    pub account_id: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct SupportChannel {
    store: Arc<dyn DocumentStore>,
}

impl SupportChannel {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Posts `text` to the channel of `account_id` on behalf of `sender_id`.
    pub async fn send_message(
        &self,
        account_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<ChatMessage> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyMessage);
        }

        let message = ChatMessage {
            id: String::new(),
            text: text.to_string(),
            sender_id: sender_id.to_string(),
            timestamp: None,
        };
        let data = serde_json::to_value(&message).map_err(StoreError::from)?;
        let snapshot = self.store.append(&messages_path(account_id), data).await?;
        let mut stored: ChatMessage = snapshot.decode()?;
        stored.id = snapshot.id().to_string();

        self.store
            .set(
                &channel_path(account_id),
                json!({ "accountId": account_id, "updatedAt": stored.timestamp }),
            )
            .await?;
        debug!(account_id, sender_id, id = %stored.id, "Chat message sent");
        Ok(stored)
    }

    /// Messages of one channel, oldest first. A message still missing its
    /// server timestamp sorts as if sent now.
    pub async fn messages(&self, account_id: &str) -> Result<Vec<ChatMessage>> {
        let now = Utc::now();
        let mut messages: Vec<ChatMessage> = self
            .store
            .list(&messages_path(account_id))
            .await?
            .iter()
            .filter_map(|snapshot| match snapshot.decode::<ChatMessage>() {
                Ok(mut message) => {
                    message.id = snapshot.id().to_string();
                    Some(message)
                }
                Err(e) => {
                    warn!(path = %snapshot.path, error = %e, "Skipping malformed chat message");
                    None
                }
            })
            .collect();
        messages.sort_by_key(|m| m.timestamp.unwrap_or(now));
        Ok(messages)
    }

    pub fn subscribe(&self, account_id: &str) -> Subscription {
        self.store.subscribe(&messages_path(account_id))
    }

    /// All channels with at least one message, most recently active first.
    pub async fn channels(&self) -> Result<Vec<ChannelSummary>> {
        let mut channels: Vec<ChannelSummary> = self
            .store
            .list("chats")
            .await?
            .iter()
            .filter_map(|snapshot| snapshot.decode().ok())
            .collect();
        channels.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(channels)
    }
}
