//! Quest progression engine.
//!
//! State machine: `not_started -> in_progress -> completed | abandoned`.
//! Every mutating operation runs as one store transaction covering the
//! progress record, the inventory and the reward balance, so a collection is
//! applied at most once even under concurrent requests.

use std::sync::Arc;

use chrono::Utc;

use super::catalog::QuestCatalog;
use super::error::QuestError;
use super::geo::{self, Coordinate};
use super::scan::{MarkerMatchValidator, ScanValidator};
use super::types::{
    CollectOutcome, CollectionResult, QuestDefinition, QuestProgress, QuestStatus, StartedQuest,
};
use crate::rewards::ledger::RewardLedger;
use crate::rewards::types::{CollectedItem, RewardBalance, UserStats};
use crate::storage::store::{DocumentStore, DocumentTransaction};

/// A collection attempt, with the scan payload for AR collections.
struct CollectRequest<'a> {
    user_id: &'a str,
    quest_id: &'a str,
    token_id: &'a str,
    location: Coordinate,
    scan_payload: Option<&'a str>,
}

/// Drives quest progress for all users.
pub struct QuestEngine<S: DocumentStore, V: ScanValidator = MarkerMatchValidator> {
    store: Arc<S>,
    catalog: QuestCatalog<S>,
    ledger: RewardLedger,
    validator: V,
}

impl<S: DocumentStore> QuestEngine<S, MarkerMatchValidator> {
    /// Engine with default rewards and marker-matching scan validation.
    pub fn with_defaults(store: Arc<S>) -> Self {
        Self::new(store, RewardLedger::default(), MarkerMatchValidator)
    }
}

impl<S: DocumentStore, V: ScanValidator> QuestEngine<S, V> {
    pub fn new(store: Arc<S>, ledger: RewardLedger, validator: V) -> Self {
        Self {
            catalog: QuestCatalog::new(Arc::clone(&store)),
            store,
            ledger,
            validator,
        }
    }

    pub fn catalog(&self) -> &QuestCatalog<S> {
        &self.catalog
    }

    /// Start a quest for a user.
    pub fn start_quest(&self, user_id: &str, quest_id: &str) -> Result<StartedQuest, QuestError> {
        let quest = self.catalog.get_quest(quest_id)?;

        let progress = self.store.run_atomic(|tx| {
            if let Some(existing) = tx.progress(user_id, quest_id)? {
                ensure_transition(quest_id, existing.status, QuestStatus::InProgress)?;
                if existing.status == QuestStatus::Abandoned {
                    tx.archive_progress(&existing)?;
                }
            }

            let progress = QuestProgress::start(user_id, &quest, Utc::now());
            tx.put_progress(&progress)?;
            Ok::<_, QuestError>(progress)
        })?;

        tracing::info!(
            "User {} started quest {} ({} steps)",
            user_id,
            quest_id,
            quest.total_steps()
        );
        Ok(StartedQuest::new(&quest, progress))
    }

    /// Collect a token by standing inside its geofence.
    pub fn collect_token(
        &self,
        user_id: &str,
        quest_id: &str,
        token_id: &str,
        location: Coordinate,
    ) -> Result<CollectionResult, QuestError> {
        self.collect(CollectRequest {
            user_id,
            quest_id,
            token_id,
            location,
            scan_payload: None,
        })
    }

    /// Collect a token with an AR scan in addition to the geofence check.
    pub fn collect_token_via_scan(
        &self,
        user_id: &str,
        quest_id: &str,
        token_id: &str,
        location: Coordinate,
        scan_payload: &str,
    ) -> Result<CollectionResult, QuestError> {
        self.collect(CollectRequest {
            user_id,
            quest_id,
            token_id,
            location,
            scan_payload: Some(scan_payload),
        })
    }

    /// Current progress of a user on a quest.
    pub fn get_progress(&self, user_id: &str, quest_id: &str) -> Result<QuestProgress, QuestError> {
        self.store
            .run_atomic(|tx| tx.progress(user_id, quest_id))
            .map_err(QuestError::from)?
            .ok_or_else(|| no_progress(user_id, quest_id))
    }

    /// Give up on an in-progress quest. The record is kept.
    pub fn abandon_quest(
        &self,
        user_id: &str,
        quest_id: &str,
    ) -> Result<QuestProgress, QuestError> {
        let progress = self.store.run_atomic(|tx| {
            let mut progress = tx
                .progress(user_id, quest_id)?
                .ok_or_else(|| no_progress(user_id, quest_id))?;

            ensure_transition(quest_id, progress.status, QuestStatus::Abandoned)?;
            progress.abandon();
            tx.put_progress(&progress)?;
            Ok::<_, QuestError>(progress)
        })?;

        tracing::info!("User {} abandoned quest {}", user_id, quest_id);
        Ok(progress)
    }

    /// Earlier attempts of a user on a quest, replaced by a restart.
    pub fn progress_history(
        &self,
        user_id: &str,
        quest_id: &str,
    ) -> Result<Vec<QuestProgress>, QuestError> {
        self.store
            .run_atomic(|tx| tx.progress_history(user_id, quest_id))
            .map_err(QuestError::from)
    }

    /// Reward balance of a user.
    pub fn balance(&self, user_id: &str) -> Result<RewardBalance, QuestError> {
        self.store
            .run_atomic(|tx| self.ledger.balance(tx, user_id))
            .map_err(QuestError::from)
    }

    /// Aggregate stats of a user.
    pub fn user_stats(&self, user_id: &str) -> Result<UserStats, QuestError> {
        self.store
            .run_atomic(|tx| self.ledger.user_stats(tx, user_id))
            .map_err(QuestError::from)
    }

    fn collect(&self, request: CollectRequest<'_>) -> Result<CollectionResult, QuestError> {
        let quest = self.catalog.get_quest(request.quest_id)?;

        let result = self
            .store
            .run_atomic(|tx| self.apply_collection(tx, &quest, &request))?;

        match result.outcome {
            CollectOutcome::Collected => tracing::info!(
                "User {} collected token {} in quest {} (step {}/{})",
                request.user_id,
                request.token_id,
                request.quest_id,
                result.progress.current_step,
                quest.total_steps()
            ),
            CollectOutcome::AlreadyCollected => tracing::debug!(
                "Token {} already collected by {}, nothing to do",
                request.token_id,
                request.user_id
            ),
        }
        if let Some(grant) = &result.reward {
            tracing::info!(
                "Quest {} completed by {}, granted {} gold",
                grant.quest_id,
                grant.user_id,
                grant.granted.gold
            );
        }

        Ok(result)
    }

    /// Eligibility checks and the state change, inside one transaction.
    fn apply_collection(
        &self,
        tx: &mut dyn DocumentTransaction,
        quest: &QuestDefinition,
        request: &CollectRequest<'_>,
    ) -> Result<CollectionResult, QuestError> {
        let mut progress = tx
            .progress(request.user_id, request.quest_id)?
            .ok_or_else(|| no_progress(request.user_id, request.quest_id))?;

        if progress.has_collected(request.token_id) {
            return Ok(CollectionResult::new(
                CollectOutcome::AlreadyCollected,
                quest,
                progress,
                None,
            ));
        }

        // Tokens can only be collected while the attempt can still complete
        ensure_transition(request.quest_id, progress.status, QuestStatus::Completed)?;

        if progress.is_locked(request.token_id) {
            tracing::warn!(
                "User {} tried locked token {} in quest {}",
                request.user_id,
                request.token_id,
                request.quest_id
            );
            return Err(QuestError::Forbidden(format!(
                "Token {} is currently locked",
                request.token_id
            )));
        }

        let token = quest.token(request.token_id).ok_or_else(|| {
            QuestError::NotFound(format!(
                "Token {} not found in quest {}",
                request.token_id, request.quest_id
            ))
        })?;

        let distance = geo::distance_meters(request.location, token.coordinates);
        tracing::debug!(
            "Token {} is {:.1} m away (radius {:.1} m)",
            token.id,
            distance,
            token.radius
        );
        if distance > token.radius {
            return Err(QuestError::OutOfRange {
                distance,
                radius: token.radius,
            });
        }

        if let Some(payload) = request.scan_payload {
            if !self.validator.validate(payload, token.ar_marker.as_ref()) {
                tracing::warn!(
                    "Scan rejected for token {} by user {}",
                    token.id,
                    request.user_id
                );
                return Err(QuestError::InvalidScan(format!(
                    "Scan does not match the marker for token {}",
                    token.id
                )));
            }
        }

        let now = Utc::now();
        progress.record_collection(quest, &token.id);

        let item = CollectedItem::new(request.user_id, request.quest_id, token, now);
        self.ledger.record_item(tx, &item, token.reward.gold)?;

        let reward = if progress.is_finished(quest) {
            progress.complete(now);
            Some(self.ledger.grant(tx, request.user_id, quest, now)?)
        } else {
            None
        };

        tx.put_progress(&progress)?;

        Ok(CollectionResult::new(
            CollectOutcome::Collected,
            quest,
            progress,
            reward,
        ))
    }
}

fn ensure_transition(quest_id: &str, from: QuestStatus, to: QuestStatus) -> Result<(), QuestError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(QuestError::Conflict(format!(
            "Quest {} is {}, cannot move to {}",
            quest_id, from, to
        )))
    }
}

fn no_progress(user_id: &str, quest_id: &str) -> QuestError {
    QuestError::NotFound(format!(
        "No progress for user {} on quest {}",
        user_id, quest_id
    ))
}
