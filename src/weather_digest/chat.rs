// weather_digest - Daily Open-Meteo forecast digests for Discord
//
// Copyright 2026 The weather_digest authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::error;
use std::fmt;

#[derive(Debug)]
pub enum ChatError {
    Internal(reqwest::Error),
    InvalidToken,
    InvalidChannel(u64),
    Unexpected(StatusCode, Url),
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::InvalidToken => write!(f, "bot token was rejected"),
            Self::InvalidChannel(id) => write!(f, "invalid channel {}", id),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
        }
    }
}

impl error::Error for ChatError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            _ => None,
        }
    }
}

/// Client for the Discord REST API bound to a single output channel.
pub struct DiscordClient {
    client: Client,
    base_url: Url,
    token: String,
    channel_id: u64,
}

impl DiscordClient {
    const USER_AGENT: &'static str = concat!("DiscordBot (weather_digest, ", env!("CARGO_PKG_VERSION"), ")");

    pub fn new<S: Into<String>>(client: Client, base_url: Url, token: S, channel_id: u64) -> Self {
        DiscordClient {
            client,
            base_url,
            token: token.into(),
            channel_id,
        }
    }

    /// Fetch the bot's own user, confirming the token is accepted.
    pub async fn current_user(&self) -> Result<User, ChatError> {
        let url = self.url(&["users", "@me"]);
        tracing::debug!(message = "making current user request", url = %url);

        let res = self.make_request(self.client.get(url.clone()), url).await?;
        res.json::<User>().await.map_err(ChatError::Internal)
    }

    /// Look up the configured output channel.
    pub async fn channel(&self) -> Result<Channel, ChatError> {
        let url = self.url(&["channels", &self.channel_id.to_string()]);
        tracing::debug!(message = "making channel request", url = %url);

        let res = self
            .make_request(self.client.get(url.clone()), url)
            .await
            .map_err(|e| self.channel_not_found(e))?;
        res.json::<Channel>().await.map_err(ChatError::Internal)
    }

    /// Post a plain text message to the output channel, as-is.
    pub async fn create_message(&self, content: &str) -> Result<Message, ChatError> {
        let url = self.url(&["channels", &self.channel_id.to_string(), "messages"]);
        tracing::debug!(message = "making create message request", url = %url, chars = content.chars().count());

        let req = self.client.post(url.clone()).json(&CreateMessage { content });
        let res = self.make_request(req, url).await.map_err(|e| self.channel_not_found(e))?;
        res.json::<Message>().await.map_err(ChatError::Internal)
    }

    async fn make_request(&self, req: RequestBuilder, url: Url) -> Result<Response, ChatError> {
        let res = req
            .header(USER_AGENT, Self::USER_AGENT)
            .header(AUTHORIZATION, format!("Bot {}", self.token))
            .send()
            .await
            .map_err(ChatError::Internal)?;

        let status = res.status();
        if status.is_success() {
            Ok(res)
        } else if status == StatusCode::UNAUTHORIZED {
            Err(ChatError::InvalidToken)
        } else {
            Err(ChatError::Unexpected(status, url))
        }
    }

    /// For requests under `channels/{id}`, a 404 means the configured channel doesn't exist.
    fn channel_not_found(&self, e: ChatError) -> ChatError {
        match e {
            ChatError::Unexpected(StatusCode::NOT_FOUND, _) => ChatError::InvalidChannel(self.channel_id),
            other => other,
        }
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut p) = url.path_segments_mut() {
            p.pop_if_empty().extend(segments);
        }

        url
    }
}

impl fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("channel_id", &self.channel_id)
            .finish()
    }
}

#[derive(Serialize, Debug)]
struct CreateMessage<'a> {
    content: &'a str,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub username: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
}

/// Destination for the bot's text messages.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, content: &str) -> Result<(), ChatError>;
}

#[async_trait]
impl MessageSink for DiscordClient {
    async fn send(&self, content: &str) -> Result<(), ChatError> {
        let msg = self.create_message(content).await?;
        tracing::debug!(message = "sent chat message", id = %msg.id, channel = %msg.channel_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> DiscordClient {
        DiscordClient::new(Client::new(), Url::parse(base).unwrap(), "secret-token", 1234567890)
    }

    #[test]
    fn urls_are_built_under_base_path() {
        let c = client("https://discord.com/api/v10/");
        assert_eq!(
            c.url(&["channels", "1234567890", "messages"]).as_str(),
            "https://discord.com/api/v10/channels/1234567890/messages"
        );
        assert_eq!(c.url(&["users", "@me"]).as_str(), "https://discord.com/api/v10/users/@me");
    }

    #[test]
    fn debug_hides_token() {
        let out = format!("{:?}", client("https://discord.com/api/v10/"));
        assert!(!out.contains("secret-token"));
        assert!(out.contains("1234567890"));
    }

    #[test]
    fn create_message_body() {
        let body = serde_json::to_string(&CreateMessage { content: "Botが起動しました" }).unwrap();
        assert_eq!(body, r#"{"content":"Botが起動しました"}"#);
    }
}
