//! Quest definition and progress types.
//!
//! Field names serialize to the camelCase identifiers the client apps read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::geo::Coordinate;
use crate::rewards::types::{RewardDescriptor, RewardGrant};

/// Quest difficulty, used to pick the default completion reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

/// What the player picks up at a token location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Story token
    #[default]
    Token,
    /// Coin pickup
    Coin,
}

/// Inventory category a collected token lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectibleKind {
    /// Unlocks a story chapter
    #[default]
    Story,
    /// Collectible item
    Collectible,
}

/// Per-token reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenReward {
    pub collectible: CollectibleKind,
    /// Gold credited on first collection
    pub gold: u64,
}

/// AR marker the client must scan at the token location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArMarker {
    pub marker_type: String,
    pub data: String,
}

/// A single physical site within a quest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenLocation {
    pub id: String,
    #[serde(default)]
    pub kind: TokenKind,
    pub coordinates: Coordinate,
    /// Geofence radius in meters
    pub radius: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reward: TokenReward,
    #[serde(default)]
    pub ar_marker: Option<ArMarker>,
    #[serde(default)]
    pub collect_instructions: Option<String>,
}

impl TokenLocation {
    /// Create a token location with default reward and no AR marker.
    pub fn new(id: &str, coordinates: Coordinate, radius: f64) -> Self {
        Self {
            id: id.to_string(),
            kind: TokenKind::Token,
            coordinates,
            radius,
            description: String::new(),
            reward: TokenReward::default(),
            ar_marker: None,
            collect_instructions: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_marker(mut self, marker_type: &str, data: &str) -> Self {
        self.ar_marker = Some(ArMarker {
            marker_type: marker_type.to_string(),
            data: data.to_string(),
        });
        self
    }

    pub fn with_reward(mut self, reward: TokenReward) -> Self {
        self.reward = reward;
        self
    }
}

/// Immutable quest definition, created by an administrator or the seed process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestDefinition {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Ordered token locations; order drives unlocking
    pub token_locations: Vec<TokenLocation>,
    /// Waypoints of the overall path
    #[serde(default)]
    pub path: Vec<Coordinate>,
    /// Completion reward; the difficulty default applies when absent
    #[serde(default)]
    pub rewards: Option<RewardDescriptor>,
}

fn default_active() -> bool {
    true
}

impl QuestDefinition {
    /// Create an active quest with no token locations.
    pub fn new(id: &str, title: &str, difficulty: Difficulty) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            difficulty,
            is_active: true,
            token_locations: Vec::new(),
            path: Vec::new(),
            rewards: None,
        }
    }

    /// Append a token location.
    pub fn with_token(mut self, token: TokenLocation) -> Self {
        self.token_locations.push(token);
        self
    }

    /// Set an explicit completion reward.
    pub fn with_rewards(mut self, rewards: RewardDescriptor) -> Self {
        self.rewards = Some(rewards);
        self
    }

    /// Look up a token location by id.
    pub fn token(&self, token_id: &str) -> Option<&TokenLocation> {
        self.token_locations.iter().find(|t| t.id == token_id)
    }

    /// Position of a token in the sequence.
    pub fn token_index(&self, token_id: &str) -> Option<usize> {
        self.token_locations.iter().position(|t| t.id == token_id)
    }

    pub fn total_steps(&self) -> usize {
        self.token_locations.len()
    }

    /// Check structural invariants before publishing.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("quest id must not be empty".to_string());
        }
        if self.token_locations.is_empty() {
            return Err(format!("quest {} has no token locations", self.id));
        }

        let mut seen = HashSet::new();
        for token in &self.token_locations {
            if token.id.trim().is_empty() {
                return Err(format!("quest {} has a token with an empty id", self.id));
            }
            if !seen.insert(token.id.as_str()) {
                return Err(format!(
                    "quest {} has duplicate token id {}",
                    self.id, token.id
                ));
            }
            if !(token.radius.is_finite() && token.radius > 0.0) {
                return Err(format!(
                    "token {} radius must be positive, got {}",
                    token.id, token.radius
                ));
            }
            token
                .coordinates
                .validate()
                .map_err(|e| format!("token {}: {}", token.id, e))?;
        }

        for waypoint in &self.path {
            waypoint.validate()?;
        }

        Ok(())
    }
}

/// Lifecycle of a user's attempt at a quest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Abandoned,
}

impl QuestStatus {
    /// Whether a transition from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: QuestStatus) -> bool {
        matches!(
            (self, next),
            (QuestStatus::NotStarted, QuestStatus::InProgress)
                | (QuestStatus::Abandoned, QuestStatus::InProgress)
                | (QuestStatus::InProgress, QuestStatus::Completed)
                | (QuestStatus::InProgress, QuestStatus::Abandoned)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestStatus::NotStarted => "not_started",
            QuestStatus::InProgress => "in_progress",
            QuestStatus::Completed => "completed",
            QuestStatus::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for QuestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per user and quest progress record.
///
/// Only mutated through the named operations below, which keep
/// `current_step == collected_tokens.len()` and the collected/locked sets
/// disjoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestProgress {
    pub quest_id: String,
    pub user_id: String,
    pub status: QuestStatus,
    /// In collection order
    pub collected_tokens: Vec<String>,
    pub locked_tokens: Vec<String>,
    pub current_step: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QuestProgress {
    /// Fresh in-progress record: every token but the first is locked.
    pub fn start(user_id: &str, quest: &QuestDefinition, now: DateTime<Utc>) -> Self {
        Self {
            quest_id: quest.id.clone(),
            user_id: user_id.to_string(),
            status: QuestStatus::InProgress,
            collected_tokens: Vec::new(),
            locked_tokens: quest
                .token_locations
                .iter()
                .skip(1)
                .map(|t| t.id.clone())
                .collect(),
            current_step: 0,
            started_at: now,
            completed_at: None,
        }
    }

    pub fn has_collected(&self, token_id: &str) -> bool {
        self.collected_tokens.iter().any(|t| t == token_id)
    }

    pub fn is_locked(&self, token_id: &str) -> bool {
        self.locked_tokens.iter().any(|t| t == token_id)
    }

    /// Mark a token collected and unlock its successor.
    pub fn record_collection(&mut self, quest: &QuestDefinition, token_id: &str) {
        if self.has_collected(token_id) {
            return;
        }

        self.collected_tokens.push(token_id.to_string());
        self.locked_tokens.retain(|t| t != token_id);

        if let Some(next) = quest
            .token_index(token_id)
            .and_then(|i| quest.token_locations.get(i + 1))
        {
            self.locked_tokens.retain(|t| *t != next.id);
        }

        self.current_step = self.collected_tokens.len() as u32;
    }

    /// Whether every token of the quest has been collected.
    pub fn is_finished(&self, quest: &QuestDefinition) -> bool {
        quest
            .token_locations
            .iter()
            .all(|t| self.has_collected(&t.id))
    }

    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = QuestStatus::Completed;
        self.completed_at = Some(now);
    }

    pub fn abandon(&mut self) {
        self.status = QuestStatus::Abandoned;
    }

    /// First token in sequence order that has not been collected.
    pub fn next_token<'q>(&self, quest: &'q QuestDefinition) -> Option<(usize, &'q TokenLocation)> {
        quest
            .token_locations
            .iter()
            .enumerate()
            .find(|(_, t)| !self.has_collected(&t.id))
    }

    /// Check the record's structural invariants against its quest.
    pub fn is_consistent(&self, quest: &QuestDefinition) -> bool {
        let step_matches = self.current_step as usize == self.collected_tokens.len();
        let disjoint = self.locked_tokens.iter().all(|t| !self.has_collected(t));
        let locked_known = self.locked_tokens.iter().all(|t| quest.token(t).is_some());
        step_matches && disjoint && locked_known
    }
}

/// Display information for a quest step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepView {
    pub token_id: String,
    /// Zero-based position in the quest
    pub step: u32,
    pub location: Coordinate,
    pub radius: f64,
    pub description: String,
    pub collect_instructions: Option<String>,
}

impl StepView {
    pub fn new(index: usize, token: &TokenLocation) -> Self {
        Self {
            token_id: token.id.clone(),
            step: index as u32,
            location: token.coordinates,
            radius: token.radius,
            description: token.description.clone(),
            collect_instructions: token.collect_instructions.clone(),
        }
    }
}

/// Response to starting a quest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedQuest {
    pub progress: QuestProgress,
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub total_steps: u32,
    pub first_step: Option<StepView>,
    pub path: Vec<Coordinate>,
}

impl StartedQuest {
    pub fn new(quest: &QuestDefinition, progress: QuestProgress) -> Self {
        Self {
            progress,
            title: quest.title.clone(),
            description: quest.description.clone(),
            difficulty: quest.difficulty,
            total_steps: quest.total_steps() as u32,
            first_step: quest.token_locations.first().map(|t| StepView::new(0, t)),
            path: quest.path.clone(),
        }
    }
}

/// Whether a collection attempt changed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectOutcome {
    Collected,
    AlreadyCollected,
}

/// Response to a collection attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionResult {
    pub outcome: CollectOutcome,
    pub progress: QuestProgress,
    pub next_step: Option<StepView>,
    pub reward: Option<RewardGrant>,
}

impl CollectionResult {
    pub fn new(
        outcome: CollectOutcome,
        quest: &QuestDefinition,
        progress: QuestProgress,
        reward: Option<RewardGrant>,
    ) -> Self {
        let next_step = progress
            .next_token(quest)
            .map(|(index, token)| StepView::new(index, token));
        Self {
            outcome,
            progress,
            next_step,
            reward,
        }
    }

    pub fn quest_completed(&self) -> bool {
        self.progress.status == QuestStatus::Completed
    }
}
