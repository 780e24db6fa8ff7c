use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use crate::config::ChannelConfig;

/// Messaging channel used to talk back to the user.
///
/// `reply` answers one inbound event by its reply token; `push` delivers
/// messages to a user identity independently of any inbound event. Both take
/// an ordered sequence of text messages.
#[async_trait]
pub trait ChannelClient: Send + Sync {
    async fn reply(&self, reply_token: &str, messages: &[String]) -> anyhow::Result<()>;
    async fn push(&self, to: &str, messages: &[String]) -> anyhow::Result<()>;
    /// Download the binary content of an inbound message (e.g. a photo).
    async fn message_content(&self, message_id: &str) -> anyhow::Result<Bytes>;
}

#[derive(Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Serialize)]
struct ReplyBody<'a> {
    #[serde(rename = "replyToken")]
    reply_token: &'a str,
    messages: Vec<TextMessage<'a>>,
}

#[derive(Serialize)]
struct PushBody<'a> {
    to: &'a str,
    messages: Vec<TextMessage<'a>>,
}

fn text_messages(messages: &[String]) -> Vec<TextMessage<'_>> {
    messages
        .iter()
        .map(|m| TextMessage {
            kind: "text",
            text: m,
        })
        .collect()
}

/// LINE Messaging API client.
#[derive(Clone)]
pub struct LineChannel {
    http: reqwest::Client,
    access_token: String,
    api_base: String,
    data_api_base: String,
}

impl LineChannel {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token: config.access_token.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            data_api_base: config.data_api_base.trim_end_matches('/').to_string(),
        }
    }

    async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> anyhow::Result<()> {
        let url = format!("{}{}", self.api_base, path);
        self.http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("channel POST {path}"))?;
        Ok(())
    }
}

#[async_trait]
impl ChannelClient for LineChannel {
    async fn reply(&self, reply_token: &str, messages: &[String]) -> anyhow::Result<()> {
        debug!(count = messages.len(), "channel reply");
        self.post_json(
            "/v2/bot/message/reply",
            &ReplyBody {
                reply_token,
                messages: text_messages(messages),
            },
        )
        .await
    }

    async fn push(&self, to: &str, messages: &[String]) -> anyhow::Result<()> {
        debug!(count = messages.len(), "channel push");
        self.post_json(
            "/v2/bot/message/push",
            &PushBody {
                to,
                messages: text_messages(messages),
            },
        )
        .await
    }

    async fn message_content(&self, message_id: &str) -> anyhow::Result<Bytes> {
        let url = format!(
            "{}/v2/bot/message/{}/content",
            self.data_api_base, message_id
        );
        let bytes = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("fetch message content {message_id}"))?
            .bytes()
            .await
            .context("read message content body")?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_body_shape() {
        let texts = ["hi".to_string(), "there".to_string()];
        let body = ReplyBody {
            reply_token: "tok-1",
            messages: text_messages(&texts),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["replyToken"], "tok-1");
        assert_eq!(json["messages"][0]["type"], "text");
        assert_eq!(json["messages"][1]["text"], "there");
    }
}
