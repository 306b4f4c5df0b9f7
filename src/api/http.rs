//! REST client for the chat backend

use super::{ChatApi, IdentityProvider};
use crate::{
    config::Settings,
    model::{Conversation, CurrentUser, Message, MessagePage},
    Error, Result,
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// Response of `POST /conversations`
#[derive(Debug, Deserialize)]
pub(crate) struct GetOrCreateResponse {
    #[serde(default)]
    pub conversation: Option<Conversation>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConversationsResponse {
    #[serde(default)]
    pub conversations: Vec<Conversation>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendResponse {
    pub message: Message,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SuccessResponse {
    #[serde(default)]
    pub success: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MeResponse {
    #[serde(default)]
    pub user: Option<CurrentUser>,
}

#[derive(Debug, Serialize)]
struct CreateConversationRequest<'a> {
    username: &'a str,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ReactionRequest<'a> {
    emoji: &'a str,
}

#[derive(Debug, Serialize)]
struct MarkReadRequest<'a> {
    message_ids: &'a [String],
}

/// HTTP implementation of [`ChatApi`] and [`IdentityProvider`]
#[derive(Clone)]
pub struct HttpApi {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpApi {
    /// Create a client for `base_url`, authenticating with `token`
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            base_url: Url::parse(base_url)?,
            token,
        })
    }

    /// Create a client from settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(&settings.api_base_url, settings.auth_token.clone())
    }

    /// Build an endpoint URL; each segment is percent-encoded
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::Api(format!("{}: {}", status, body.trim())))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!("GET {}", url);
        let response = self.authorized(self.client.get(url)).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T> {
        debug!("POST {}", url);
        let response = self
            .authorized(self.client.post(url))
            .json(body)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn post_empty(&self, url: Url) -> Result<()> {
        debug!("POST {}", url);
        let response = self.authorized(self.client.post(url)).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatApi for HttpApi {
    async fn get_or_create_conversation(&self, username: &str) -> Result<Conversation> {
        let url = self.endpoint(&["conversations"])?;
        let response: GetOrCreateResponse = self
            .post_json(url, &CreateConversationRequest { username })
            .await?;

        match (response.conversation, response.error) {
            (Some(conversation), _) => Ok(conversation),
            (None, Some(error)) => Err(Error::Bootstrap(error)),
            (None, None) => Err(Error::Bootstrap(format!(
                "no conversation returned for {}",
                username
            ))),
        }
    }

    async fn get_messages(
        &self,
        conversation_id: &str,
        before: Option<&str>,
    ) -> Result<MessagePage> {
        let mut url = self.endpoint(&["conversations", conversation_id, "messages"])?;
        if let Some(before) = before {
            url.query_pairs_mut().append_pair("before", before);
        }
        self.get_json(url).await
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<Message> {
        let url = self.endpoint(&["conversations", conversation_id, "messages"])?;
        let response: SendResponse = self
            .post_json(url, &SendMessageRequest { content: text, reply_to })
            .await?;
        Ok(response.message)
    }

    async fn add_reaction(
        &self,
        conversation_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<bool> {
        let url = self.endpoint(&[
            "conversations",
            conversation_id,
            "messages",
            message_id,
            "reactions",
        ])?;
        let response: SuccessResponse = self.post_json(url, &ReactionRequest { emoji }).await?;
        Ok(response.success)
    }

    async fn remove_reaction(
        &self,
        conversation_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<bool> {
        let url = self.endpoint(&[
            "conversations",
            conversation_id,
            "messages",
            message_id,
            "reactions",
            emoji,
        ])?;
        debug!("DELETE {}", url);
        let response = self.authorized(self.client.delete(url)).send().await?;
        let response: SuccessResponse = Self::check(response).await?.json().await?;
        Ok(response.success)
    }

    async fn mark_messages_as_read(&self, message_ids: &[String]) -> Result<()> {
        if message_ids.is_empty() {
            return Ok(());
        }
        let url = self.endpoint(&["messages", "read"])?;
        let response = self
            .authorized(self.client.post(url))
            .json(&MarkReadRequest { message_ids })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn mark_conversation_as_read(&self, conversation_id: &str) -> Result<()> {
        let url = self.endpoint(&["conversations", conversation_id, "read"])?;
        self.post_empty(url).await
    }

    async fn get_conversations(&self) -> Result<Vec<Conversation>> {
        let url = self.endpoint(&["conversations"])?;
        let response: ConversationsResponse = self.get_json(url).await?;
        Ok(response.conversations)
    }
}

#[async_trait]
impl IdentityProvider for HttpApi {
    async fn current_user(&self) -> Result<Option<CurrentUser>> {
        if self.token.is_none() {
            return Ok(None);
        }
        let url = self.endpoint(&["auth", "me"])?;
        let response = self.authorized(self.client.get(url)).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        let me: MeResponse = Self::check(response).await?.json().await?;
        Ok(me.user)
    }
}
