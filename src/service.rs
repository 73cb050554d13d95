//! Conversation service client
//!
//! The guardian's replies come from an external HTTP service. The engine
//! only depends on the [`ConversationService`] trait; [`HttpConversationClient`]
//! is the production implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::ServiceConfig;
use crate::emotion::Emotion;
use crate::error::{GameError, Result};

/// Issued by the service when a session starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTicket {
    pub session_id: String,
    /// Opening line, if the service sends one
    pub greeting: Option<String>,
}

/// The service's answer to one player message
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReply {
    /// Unprocessed reply, possibly carrying control tags
    pub raw_reply: String,
    pub merit_score: i32,
    pub is_won: bool,
    pub is_lost: bool,
    pub audio_url: Option<String>,
    pub win_phrase_detected: bool,
    /// Negative point categories (name → points, non-positive)
    pub penalties: BTreeMap<String, i32>,
    /// Structured emotion, preferred over tags in the text
    pub emotion: Option<Emotion>,
}

/// Anything that can hold a conversation with the guardian.
#[async_trait]
pub trait ConversationService: Send + Sync {
    async fn start_session(&self, difficulty: &str, character_name: &str) -> Result<SessionTicket>;

    async fn send_turn(&self, session_id: &str, message: &str, include_audio: bool) -> Result<TurnReply>;

    /// Liveness probe; services without one are assumed healthy.
    async fn health(&self) -> Result<bool> {
        Ok(true)
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Serialize)]
struct StartRequest<'a> {
    difficulty: &'a str,
    pirate_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct StartResponse {
    game_id: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct TurnRequest<'a> {
    game_id: &'a str,
    message: &'a str,
    include_audio: bool,
}

#[derive(Debug, Deserialize)]
struct TurnResponse {
    pirate_response: Option<String>,
    merit_score: Option<f64>,
    #[serde(default)]
    is_won: bool,
    #[serde(default)]
    is_lost: bool,
    audio_url: Option<String>,
    #[serde(default)]
    win_phrase_detected: bool,
    negative_categories: Option<BTreeMap<String, i32>>,
    emotion: Option<String>,
}

impl StartResponse {
    fn into_ticket(self) -> Result<SessionTicket> {
        let session_id = self
            .game_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GameError::MalformedReply("start response has no game_id".into()))?;

        Ok(SessionTicket {
            session_id,
            greeting: self.message.filter(|m| !m.trim().is_empty()),
        })
    }
}

impl TurnResponse {
    fn into_reply(self, base_url: &str) -> Result<TurnReply> {
        let raw_reply = self
            .pirate_response
            .ok_or_else(|| GameError::MalformedReply("missing pirate_response".into()))?;

        let merit = self
            .merit_score
            .ok_or_else(|| GameError::MalformedReply("missing merit_score".into()))?;
        if !merit.is_finite() {
            return Err(GameError::MalformedReply(format!(
                "merit_score is not a number: {}",
                merit
            )));
        }

        Ok(TurnReply {
            raw_reply,
            merit_score: merit.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32,
            is_won: self.is_won,
            is_lost: self.is_lost,
            audio_url: self
                .audio_url
                .filter(|u| !u.trim().is_empty())
                .map(|u| resolve_url(base_url, &u)),
            win_phrase_detected: self.win_phrase_detected,
            penalties: self.negative_categories.unwrap_or_default(),
            emotion: self.emotion.as_deref().map(Emotion::from_label),
        })
    }
}

/// Audio URLs may come back relative to the service root.
fn resolve_url(base_url: &str, url: &str) -> String {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    }
}

// ============================================================================
// HTTP client
// ============================================================================

/// Client for the game's HTTP conversation service
pub struct HttpConversationClient {
    client: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
}

impl HttpConversationClient {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GameError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_ms: config.request_timeout_ms,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// A client-side timeout reports the same error as the session's own deadline.
    fn request_error(&self, err: reqwest::Error) -> GameError {
        if err.is_timeout() {
            GameError::Timeout(self.timeout_ms)
        } else {
            err.into()
        }
    }
}

#[async_trait]
impl ConversationService for HttpConversationClient {
    #[instrument(skip(self), fields(service.url = %self.base_url))]
    async fn start_session(&self, difficulty: &str, character_name: &str) -> Result<SessionTicket> {
        let response = self
            .client
            .post(self.endpoint("/api/game/start"))
            .json(&StartRequest {
                difficulty,
                pirate_name: character_name,
            })
            .send()
            .await
            .map_err(|e| GameError::StartFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GameError::StartFailed(format!("service returned HTTP {}", status.as_u16())));
        }

        let body: StartResponse = response
            .json()
            .await
            .map_err(|e| GameError::StartFailed(format!("unreadable start response: {}", e)))?;
        let ticket = body
            .into_ticket()
            .map_err(|e| GameError::StartFailed(e.to_string()))?;

        debug!(session.id = %ticket.session_id, "session issued");
        Ok(ticket)
    }

    #[instrument(skip(self, message), fields(session.id = %session_id, message.len = message.len()))]
    async fn send_turn(&self, session_id: &str, message: &str, include_audio: bool) -> Result<TurnReply> {
        let response = self
            .client
            .post(self.endpoint("/api/game/conversation"))
            .json(&TurnRequest {
                game_id: session_id,
                message,
                include_audio,
            })
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GameError::Http {
                status: status.as_u16(),
            });
        }

        let body: TurnResponse = response
            .json()
            .await
            .map_err(|e| GameError::MalformedReply(e.to_string()))?;
        body.into_reply(&self.base_url)
    }

    async fn health(&self) -> Result<bool> {
        let response = self
            .client
            .get(self.endpoint("/health"))
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        Ok(response.status().is_success())
    }
}
