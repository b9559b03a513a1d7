use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

use crate::auth::{AuthEvent, AuthNotifier, CredentialStore};
use crate::citations::{CitationRecord, CitationRegistry};
use crate::composer::Composer;
use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionError, ConnectionManager, ReadyState};
use crate::highlight::{mark_sections, MarkedSection};
use crate::protocol::{self, ClientFrame, MessageContext, ServerEvent};
use crate::store::models::Document;
use crate::store::{DocumentStore, StoreError};
use crate::stream::{StreamReducer, StreamState, TranscriptEntry};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no conversation is open")]
    NoConversation,
    #[error("message is empty")]
    EmptyMessage,
    #[error("unknown citation: {0}")]
    UnknownCitation(String),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What changed after [`ChatSession::next_update`] or
/// [`ChatSession::handle_frame`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SessionUpdate {
    /// An event was folded into the transcript.
    Transcript,
    /// `end_of_response` arrived; the session is idle again.
    ResponseComplete,
    ConversationCreated(String),
    /// A frame that could not be decoded was dropped.
    Ignored,
    Status(ReadyState),
    AuthExpired,
    /// The connection ended for good.
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FocusedCitation {
    pub number: usize,
    pub record: CitationRecord,
}

/// A document prepared for display, optionally focused on one citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentView {
    pub document: Document,
    pub sections: Vec<MarkedSection>,
    pub focus: Option<FocusedCitation>,
    /// Every known citation into this document.
    pub citations: Vec<CitationRecord>,
}

struct Link {
    connection: Connection,
    states: watch::Receiver<ReadyState>,
}

enum Wake {
    Frame(Option<String>),
    State,
    Auth,
}

/// One user's view of one conversation at a time.
pub struct ChatSession {
    connections: ConnectionManager,
    reducer: StreamReducer,
    state: StreamState,
    citations: CitationRegistry,
    link: Option<Link>,
    auth_events: broadcast::Receiver<AuthEvent>,
    streaming: bool,
    composer: Composer,
}

impl ChatSession {
    pub fn new(
        config: Arc<ClientConfig>,
        credentials: Arc<dyn CredentialStore>,
        auth: AuthNotifier,
    ) -> Self {
        let reducer = StreamReducer::new(config.analysis_tool.clone());
        let auth_events = auth.subscribe();
        Self {
            connections: ConnectionManager::new(config, credentials, auth),
            reducer,
            state: StreamState::new(),
            citations: CitationRegistry::new(),
            link: None,
            auth_events,
            streaming: false,
            composer: Composer::default(),
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.link.as_ref().map(|link| link.connection.conversation_id())
    }

    pub fn ready_state(&self) -> ReadyState {
        self.link
            .as_ref()
            .map_or(ReadyState::Closed, |link| link.connection.ready_state())
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.state.transcript
    }

    pub fn citations(&self) -> &CitationRegistry {
        &self.citations
    }

    pub fn citations_mut(&mut self) -> &mut CitationRegistry {
        &mut self.citations
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn composer(&mut self) -> &mut Composer {
        &mut self.composer
    }

    /// Leave the current conversation (if any), forget everything about it
    /// and subscribe to `conversation_id`.
    pub async fn switch_conversation(&mut self, conversation_id: &str) -> Result<(), SessionError> {
        self.leave().await;
        let connection = self.connections.connect(conversation_id)?;
        let states = connection.state_changes();
        info!("Switched to conversation {}", conversation_id);
        self.link = Some(Link { connection, states });
        Ok(())
    }

    /// Close the connection and reset all per-conversation state.
    pub async fn leave(&mut self) {
        if let Some(link) = self.link.take() {
            link.connection.close().await;
        }
        self.state = StreamState::new();
        self.citations.reset();
        self.composer.reset();
        self.streaming = false;
    }

    pub async fn send_message(
        &mut self,
        text: &str,
        context: &MessageContext,
    ) -> Result<(), SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let link = self.link.as_ref().ok_or(SessionError::NoConversation)?;
        link.connection
            .send(&ClientFrame {
                message: text,
                context,
            })
            .await?;
        self.state.push_user(text);
        self.streaming = true;
        Ok(())
    }

    /// Decode one inbound frame and fold it into the session.
    pub fn handle_frame(&mut self, frame: &str) -> SessionUpdate {
        let event = match protocol::decode(frame) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping frame: {}", e);
                return SessionUpdate::Ignored;
            }
        };

        let update = match &event {
            ServerEvent::EndOfResponse {} => {
                self.streaming = false;
                SessionUpdate::ResponseComplete
            }
            ServerEvent::ConversationCreated { id } => SessionUpdate::ConversationCreated(id.clone()),
            _ => SessionUpdate::Transcript,
        };
        let state = std::mem::take(&mut self.state);
        self.state = self.reducer.apply(state, event, &mut self.citations);
        update
    }

    /// Wait for the next thing worth re-rendering.
    pub async fn next_update(&mut self) -> Result<SessionUpdate, SessionError> {
        let wake = {
            let Link { connection, states } =
                self.link.as_mut().ok_or(SessionError::NoConversation)?;
            let auth_events = &mut self.auth_events;
            tokio::select! {
                frame = connection.recv() => Wake::Frame(frame),
                _ = states.changed(), if states.has_changed().is_ok() => Wake::State,
                event = auth_events.recv() => match event {
                    Ok(AuthEvent::Expired) | Err(broadcast::error::RecvError::Lagged(_)) => Wake::Auth,
                    Err(broadcast::error::RecvError::Closed) => Wake::State,
                },
            }
        };

        match wake {
            Wake::Frame(Some(frame)) => Ok(self.handle_frame(&frame)),
            Wake::Frame(None) => {
                self.link = None;
                self.streaming = false;
                Ok(SessionUpdate::Disconnected)
            }
            Wake::State => Ok(SessionUpdate::Status(self.ready_state())),
            Wake::Auth => Ok(SessionUpdate::AuthExpired),
        }
    }

    /// Resolve citation `id`, fetch its document and mark the quote in it.
    pub async fn open_citation(
        &mut self,
        id: &str,
        documents: &dyn DocumentStore,
    ) -> Result<DocumentView, SessionError> {
        let record = self
            .citations
            .resolve(id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownCitation(id.to_string()))?;
        let number = self.citations.display_number(id);
        let document = documents.get_by_id(&record.document_id).await?;

        Ok(DocumentView {
            sections: mark_sections(&document.content, Some(&record.text)),
            citations: self
                .citations
                .citations_for_document(&record.document_id)
                .to_vec(),
            focus: Some(FocusedCitation { number, record }),
            document,
        })
    }

    /// Fetch a document without focusing a citation.
    pub async fn open_document(
        &self,
        document_id: &str,
        documents: &dyn DocumentStore,
    ) -> Result<DocumentView, SessionError> {
        let document = documents.get_by_id(document_id).await?;
        Ok(DocumentView {
            sections: mark_sections(&document.content, None),
            citations: self.citations.citations_for_document(document_id).to_vec(),
            focus: None,
            document,
        })
    }
}
