pub mod models;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::auth::{AuthNotifier, CredentialStore};
use crate::config::{ClientConfig, ConfigError};
use crate::protocol::TagSelection;
use models::{Conversation, Document, DocumentList, DocumentSummary, TagList, TitleUpdate};

pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("not signed in")]
    MissingToken,
    #[error("credential rejected by server")]
    Unauthorized,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Conversation>, StoreError>;
    async fn create(&self, title: Option<&str>) -> Result<Conversation, StoreError>;
    async fn get(&self, id: &str) -> Result<Conversation, StoreError>;
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
    async fn update_title(&self, id: &str, title: &str) -> Result<Conversation, StoreError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_by_id(&self, document_id: &str) -> Result<Document, StoreError>;
}

/// REST client for the conversation and document endpoints.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: Arc<ClientConfig>,
    credentials: Arc<dyn CredentialStore>,
    auth: AuthNotifier,
}

impl ApiClient {
    pub fn new(
        config: Arc<ClientConfig>,
        credentials: Arc<dyn CredentialStore>,
        auth: AuthNotifier,
    ) -> Self {
        Self {
            client: Client::new(),
            config,
            credentials,
            auth,
        }
    }

    pub async fn list_documents(
        &self,
        tags: &[TagSelection],
    ) -> Result<Vec<DocumentSummary>, StoreError> {
        let query: Vec<(&str, String)> = tags
            .iter()
            .map(|tag| ("tags", format!("{}:{}", tag.key, tag.value)))
            .collect();
        let req = self.request(Method::GET, &["documents", ""])?.query(&query);
        let list: DocumentList = self.send(req).await?;
        Ok(list.documents)
    }

    pub async fn available_tags(&self) -> Result<Vec<String>, StoreError> {
        let req = self.request(Method::GET, &["documents", "tags"])?;
        let list: TagList = self.send(req).await?;
        Ok(list.tags)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, StoreError> {
        let token = self.credentials.token().ok_or(StoreError::MissingToken)?;
        let url = self.config.api_url(segments)?;
        debug!("{} {}", method, url);
        Ok(self.client.request(method, url).bearer_auth(token))
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, StoreError> {
        let resp = req.send().await?;
        let status = resp.status();

        if status == StatusCode::UNAUTHORIZED {
            self.auth.expire(self.credentials.as_ref());
            return Err(StoreError::Unauthorized);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(StoreError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl ConversationStore for ApiClient {
    async fn list(&self) -> Result<Vec<Conversation>, StoreError> {
        let req = self.request(Method::GET, &["chat", "conversations"])?;
        self.send(req).await
    }

    async fn create(&self, title: Option<&str>) -> Result<Conversation, StoreError> {
        let title = title.unwrap_or(DEFAULT_CONVERSATION_TITLE);
        let req = self
            .request(Method::POST, &["chat", "conversations"])?
            .query(&[("title", title)]);
        let conversation: Conversation = self.send(req).await?;
        info!("Created conversation {}", conversation.id);
        Ok(conversation)
    }

    async fn get(&self, id: &str) -> Result<Conversation, StoreError> {
        let req = self.request(Method::GET, &["chat", "conversations", id])?;
        self.send(req).await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let req = self.request(Method::DELETE, &["chat", "conversations", id])?;
        let _: serde_json::Value = self.send(req).await?;
        Ok(())
    }

    async fn update_title(&self, id: &str, title: &str) -> Result<Conversation, StoreError> {
        let req = self
            .request(Method::PUT, &["chat", "conversations", id, "title"])?
            .json(&TitleUpdate { title });
        self.send(req).await
    }
}

#[async_trait]
impl DocumentStore for ApiClient {
    async fn get_by_id(&self, document_id: &str) -> Result<Document, StoreError> {
        let req = self.request(Method::GET, &["documents", document_id])?;
        self.send(req).await
    }
}
