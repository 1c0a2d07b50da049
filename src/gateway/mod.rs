//! Collection gateway.
//!
//! The operation surface route handlers call. Resolves the caller's identity,
//! checks request shape, dispatches to the [`QuestEngine`] and maps engine
//! errors to stable statuses. Holds no business logic of its own.

pub mod auth;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::quests::engine::QuestEngine;
use crate::quests::error::QuestError;
use crate::quests::geo::Coordinate;
use crate::quests::scan::ScanValidator;
use crate::storage::store::{DocumentStore, StoreError};

pub use auth::{IdentityResolver, StaticIdentityResolver};

pub const STATUS_OK: u16 = 200;
pub const STATUS_CREATED: u16 = 201;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_UNAUTHORIZED: u16 = 401;
pub const STATUS_FORBIDDEN: u16 = 403;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_CONFLICT: u16 = 409;
pub const STATUS_UNPROCESSABLE: u16 = 422;
pub const STATUS_INTERNAL_ERROR: u16 = 500;
pub const STATUS_UNAVAILABLE: u16 = 503;

const UNAUTHORIZED_MESSAGE: &str = "Unauthorized access";
const SERVER_ERROR_MESSAGE: &str = "An internal server error occurred";

/// Operations exposed to route handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum Operation {
    ListQuests,
    #[serde(rename_all = "camelCase")]
    GetQuest { quest_id: String },
    #[serde(rename_all = "camelCase")]
    StartQuest { quest_id: String },
    #[serde(rename_all = "camelCase")]
    CollectToken {
        quest_id: String,
        token_id: String,
        user_location: Coordinate,
    },
    #[serde(rename_all = "camelCase")]
    CollectTokenViaScan {
        quest_id: String,
        token_id: String,
        user_location: Coordinate,
        scan_payload: String,
    },
    #[serde(rename_all = "camelCase")]
    GetProgress { quest_id: String },
    #[serde(rename_all = "camelCase")]
    AbandonQuest { quest_id: String },
    GetUserStats,
}

/// An authenticated request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayRequest {
    /// Bearer credential, with or without the `Bearer ` prefix
    pub credential: String,
    #[serde(flatten)]
    pub operation: Operation,
}

impl GatewayRequest {
    pub fn new(credential: &str, operation: Operation) -> Self {
        Self {
            credential: credential.to_string(),
            operation,
        }
    }
}

/// Transport-neutral response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "is_false")]
    pub retryable: bool,
    pub body: Value,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl GatewayResponse {
    fn success(status: u16, body: Value) -> Self {
        Self {
            status,
            retryable: false,
            body,
        }
    }

    fn failure(status: u16, kind: &str, message: &str, retryable: bool) -> Self {
        Self {
            status,
            retryable,
            body: json!({ "error": kind, "message": message }),
        }
    }

    /// Response for a request that could not be parsed.
    pub fn malformed(reason: &str) -> Self {
        Self::failure(STATUS_BAD_REQUEST, "invalid_request", reason, false)
    }

    /// Map an engine error to its external status and message.
    pub fn from_error(err: &QuestError) -> Self {
        let status = error_status(err);
        let retryable = err.is_retryable();

        match err {
            QuestError::Storage(inner) => {
                tracing::error!("Request failed with storage error: {}", inner);
                Self::failure(status, "internal", SERVER_ERROR_MESSAGE, false)
            }
            _ => Self::failure(status, error_kind(err), &err.to_string(), retryable),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Stable status code for an engine error.
pub fn error_status(err: &QuestError) -> u16 {
    match err {
        QuestError::NotFound(_) => STATUS_NOT_FOUND,
        QuestError::Conflict(_) => STATUS_CONFLICT,
        QuestError::Forbidden(_) => STATUS_FORBIDDEN,
        QuestError::OutOfRange { .. } => STATUS_BAD_REQUEST,
        QuestError::InvalidScan(_) => STATUS_UNPROCESSABLE,
        QuestError::Validation(_) => STATUS_BAD_REQUEST,
        QuestError::Transient { .. } => STATUS_UNAVAILABLE,
        QuestError::Storage(_) => STATUS_INTERNAL_ERROR,
    }
}

fn error_kind(err: &QuestError) -> &'static str {
    match err {
        QuestError::NotFound(_) => "not_found",
        QuestError::Conflict(_) => "conflict",
        QuestError::Forbidden(_) => "forbidden",
        QuestError::OutOfRange { .. } => "out_of_range",
        QuestError::InvalidScan(_) => "invalid_scan",
        QuestError::Validation(_) => "invalid_request",
        QuestError::Transient { .. } => "transient",
        QuestError::Storage(_) => "internal",
    }
}

/// Dispatches authenticated requests to the engine.
pub struct CollectionGateway<S: DocumentStore, V: ScanValidator, R: IdentityResolver> {
    engine: QuestEngine<S, V>,
    identity: R,
}

impl<S: DocumentStore, V: ScanValidator, R: IdentityResolver> CollectionGateway<S, V, R> {
    pub fn new(engine: QuestEngine<S, V>, identity: R) -> Self {
        Self { engine, identity }
    }

    pub fn engine(&self) -> &QuestEngine<S, V> {
        &self.engine
    }

    /// Handle one request.
    pub fn handle(&self, request: &GatewayRequest) -> GatewayResponse {
        let Some(user_id) = self.identity.resolve(&request.credential) else {
            tracing::warn!("Rejected request with unknown credential");
            return GatewayResponse::failure(
                STATUS_UNAUTHORIZED,
                "unauthorized",
                UNAUTHORIZED_MESSAGE,
                false,
            );
        };

        match self.dispatch(&user_id, &request.operation) {
            Ok((status, body)) => GatewayResponse::success(status, body),
            Err(err) => {
                tracing::debug!("{:?} for {} failed: {}", request.operation, user_id, err);
                GatewayResponse::from_error(&err)
            }
        }
    }

    fn dispatch(&self, user_id: &str, operation: &Operation) -> Result<(u16, Value), QuestError> {
        match operation {
            Operation::ListQuests => {
                respond(STATUS_OK, &self.engine.catalog().list_active_quests()?)
            }
            Operation::GetQuest { quest_id } => {
                require_id("questId", quest_id)?;
                respond(STATUS_OK, &*self.engine.catalog().get_quest(quest_id)?)
            }
            Operation::StartQuest { quest_id } => {
                require_id("questId", quest_id)?;
                respond(STATUS_CREATED, &self.engine.start_quest(user_id, quest_id)?)
            }
            Operation::CollectToken {
                quest_id,
                token_id,
                user_location,
            } => {
                require_id("questId", quest_id)?;
                require_id("tokenId", token_id)?;
                require_location(user_location)?;
                respond(
                    STATUS_OK,
                    &self
                        .engine
                        .collect_token(user_id, quest_id, token_id, *user_location)?,
                )
            }
            Operation::CollectTokenViaScan {
                quest_id,
                token_id,
                user_location,
                scan_payload,
            } => {
                require_id("questId", quest_id)?;
                require_id("tokenId", token_id)?;
                require_location(user_location)?;
                require_id("scanPayload", scan_payload)?;
                respond(
                    STATUS_OK,
                    &self.engine.collect_token_via_scan(
                        user_id,
                        quest_id,
                        token_id,
                        *user_location,
                        scan_payload,
                    )?,
                )
            }
            Operation::GetProgress { quest_id } => {
                require_id("questId", quest_id)?;
                respond(STATUS_OK, &self.engine.get_progress(user_id, quest_id)?)
            }
            Operation::AbandonQuest { quest_id } => {
                require_id("questId", quest_id)?;
                respond(STATUS_OK, &self.engine.abandon_quest(user_id, quest_id)?)
            }
            Operation::GetUserStats => respond(STATUS_OK, &self.engine.user_stats(user_id)?),
        }
    }
}

fn respond<T: Serialize + ?Sized>(status: u16, value: &T) -> Result<(u16, Value), QuestError> {
    serde_json::to_value(value)
        .map(|body| (status, body))
        .map_err(|e| QuestError::Storage(StoreError::Serialization(e)))
}

fn require_id(field: &str, value: &str) -> Result<(), QuestError> {
    if value.trim().is_empty() {
        return Err(QuestError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn require_location(location: &Coordinate) -> Result<(), QuestError> {
    location
        .validate()
        .map_err(|e| QuestError::Validation(format!("userLocation: {}", e)))
}
