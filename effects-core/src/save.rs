//! Saving throws against persistent damage.
//!
//! A successful flat `1d20` check against the effect's DC removes it.
//! Non-player actors save immediately while their turn is processed;
//! players get a button and save later through [`SaveResolver::player_save`].

use crate::actor::{ActorSnapshot, EffectId, TokenId};
use crate::effect::EffectRecord;
use crate::error::{AutomationError, Result};
use crate::host::Host;
use crate::locks::ActorLocks;
use crate::narration::{SaveAnnouncement, Visibility};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The check rolled for every save.
pub const SAVE_FORMULA: &str = "1d20";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveOutcome {
    /// The effect was removed.
    Success,
    /// The effect stays.
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResult {
    pub outcome: SaveOutcome,
    pub total: i64,
    pub difficulty_class: i64,
}

/// Rolls saves and removes effects that were saved against.
#[derive(Clone)]
pub struct SaveResolver {
    host: Host,
    locks: ActorLocks,
    announce_timeout: Duration,
}

impl SaveResolver {
    pub fn new(host: Host, locks: ActorLocks, announce_timeout: Duration) -> Self {
        Self {
            host,
            locks,
            announce_timeout,
        }
    }

    /// Roll a save for `effect_id` on `actor`.
    ///
    /// The caller must hold the actor's lock.
    pub async fn attempt_save(
        &self,
        actor: &ActorSnapshot,
        effect_id: EffectId,
        record: &EffectRecord,
    ) -> Result<SaveResult> {
        let roll = self.host.dice.evaluate_random(SAVE_FORMULA).await?;
        let announcement = SaveAnnouncement {
            speaker: actor.name.clone(),
            effect_id,
            total: roll.total,
            difficulty_class: record.difficulty_class,
            visibility: if actor.has_player_owner {
                Visibility::All
            } else {
                Visibility::GmOnly
            },
        };

        let shown = tokio::time::timeout(
            self.announce_timeout,
            self.host.presenter.announce_save(announcement),
        )
        .await;
        if shown.is_err() {
            tracing::warn!(
                effect = %effect_id,
                timeout = ?self.announce_timeout,
                "Save roll presentation timed out, resolving anyway"
            );
        }

        let outcome = if roll.meets_dc(record.difficulty_class) {
            self.host.store.delete_effect(actor.id, effect_id).await?;
            tracing::info!(actor = %actor.name, effect = %effect_id, total = roll.total, "Saved against persistent effect");
            SaveOutcome::Success
        } else {
            tracing::debug!(actor = %actor.name, effect = %effect_id, total = roll.total, "Failed save");
            SaveOutcome::Failure
        };

        Ok(SaveResult {
            outcome,
            total: roll.total,
            difficulty_class: record.difficulty_class,
        })
    }

    /// Deferred save requested from a player's save button.
    pub async fn player_save(&self, token_id: TokenId, effect_id: EffectId) -> Result<SaveResult> {
        tracing::debug!(token = %token_id, effect = %effect_id, "Save button clicked");

        let token = self
            .host
            .targets
            .token(token_id)
            .ok_or(AutomationError::TokenNotFound(token_id))?;
        let _guard = self.locks.lock(token.actor_id).await;

        let stored = self
            .host
            .store
            .effects(token.actor_id)
            .await?
            .into_iter()
            .find(|e| e.id == effect_id && e.is_automated());
        let Some(stored) = stored else {
            self.host.presenter.warn("You already saved on this effect");
            return Err(AutomationError::AlreadyResolved(effect_id));
        };

        let record = stored.record()?;
        let actor = self.host.store.actor(token.actor_id).await?;
        self.attempt_save(&actor, effect_id, &record).await
    }
}
