//! `AutomatedEffect`: the operations hosts call.

use crate::actor::{ActorId, EffectId, TokenId, TokenRef};
use crate::config::AutomationConfig;
use crate::conflict::{self, ConflictAction, EffectStrength};
use crate::effect::{EffectRecord, RawEffect, StoredEffect, TurnEdge};
use crate::error::{AutomationError, Result};
use crate::host::Host;
use crate::links::{LinkOutcome, LinkSet};
use crate::locks::ActorLocks;
use crate::narration::ConfirmPrompt;
use crate::save::{SaveResolver, SaveResult};
use crate::turn::{self, TurnProcessor, TurnReport};
use serde::{Deserialize, Serialize};

/// Result of [`AutomatedEffect::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(EffectId),
    Replaced { removed: EffectId, created: EffectId },
    /// The incoming effect was dropped in favour of the existing one.
    Kept { existing: EffectId, prompted: bool },
}

impl CreateOutcome {
    pub fn created(&self) -> Option<EffectId> {
        match *self {
            CreateOutcome::Created(id) | CreateOutcome::Replaced { created: id, .. } => Some(id),
            CreateOutcome::Kept { .. } => None,
        }
    }
}

/// Tokens the user has selected (controlled) and targeted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub controlled: Vec<TokenId>,
    pub targeted: Vec<TokenId>,
}

impl Selection {
    pub fn controlled(tokens: impl IntoIterator<Item = TokenId>) -> Self {
        Self {
            controlled: tokens.into_iter().collect(),
            targeted: Vec::new(),
        }
    }

    pub fn with_targets(mut self, tokens: impl IntoIterator<Item = TokenId>) -> Self {
        self.targeted = tokens.into_iter().collect();
        self
    }
}

/// A turn-start or turn-end signal from the combat tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnEvent {
    pub edge: TurnEdge,
    /// The combatant's base actor.
    pub actor_id: ActorId,
    /// The combatant's own token.
    pub token_id: TokenId,
}

/// Persistent effect automation over a host.
#[derive(Clone)]
pub struct AutomatedEffect {
    host: Host,
    config: AutomationConfig,
    locks: ActorLocks,
    turns: TurnProcessor,
    saves: SaveResolver,
}

impl AutomatedEffect {
    pub fn new(host: Host, config: AutomationConfig) -> Self {
        let locks = ActorLocks::new();
        let saves = SaveResolver::new(host.clone(), locks.clone(), config.save_roll_timeout);
        let turns = TurnProcessor::new(host.clone(), locks.clone(), saves.clone());
        Self {
            host,
            config,
            locks,
            turns,
            saves,
        }
    }

    pub fn config(&self) -> &AutomationConfig {
        &self.config
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Apply a persistent effect to the actor of `target`.
    ///
    /// An effect of the same category already on the actor is replaced,
    /// kept, or the user is asked, depending on which one is stronger.
    /// `force` skips the comparison and always creates, leaving any
    /// existing effect in place.
    ///
    /// The dialog is shown without holding the actor's lock. The answer
    /// only counts for the record it was asked about: if that record was
    /// removed or replaced meanwhile, the decision is made again.
    pub async fn create(&self, target: TokenId, raw: RawEffect, force: bool) -> Result<CreateOutcome> {
        let dice = self.host.dice.as_ref();
        let record = EffectRecord::normalize(raw, |f: &str| dice.validate(f)).inspect_err(|e| {
            tracing::debug!(error = %e, "Rejected effect");
            self.host.presenter.warn("Invalid Effect");
        })?;

        let token = self.token(target)?;
        let actor = token.actor_id;
        let mut answer: Option<(EffectId, bool)> = None;

        loop {
            let guard = self.locks.lock(actor).await;

            let existing = if force {
                None
            } else {
                self.existing(actor, &record.category).await?
            };
            let current = existing
                .as_ref()
                .map(|(_, r)| EffectStrength::of(r, dice))
                .transpose()?;
            let incoming = EffectStrength::of(&record, dice)?;

            let mut action = conflict::resolve(current, incoming, force);
            tracing::debug!(?action, category = %record.category, "Automatic replacement");

            let mut prompted = false;
            if let (ConflictAction::PromptUser, Some((id, old))) = (action, &existing) {
                match answer {
                    Some((asked, replace)) if asked == *id => {
                        prompted = true;
                        action = action.settle(replace);
                    }
                    _ => {
                        let prompt = ConfirmPrompt::replace_effect(
                            (&old.magnitude_formula, old.difficulty_class),
                            (&record.magnitude_formula, record.difficulty_class),
                        );
                        let asked = *id;
                        drop(guard);
                        answer = Some((asked, self.host.confirm.confirm(prompt).await));
                        continue;
                    }
                }
            }

            let removed = match (action, &existing) {
                (ConflictAction::KeepExisting, Some((id, _))) | (ConflictAction::PromptUser, Some((id, _))) => {
                    return Ok(CreateOutcome::Kept {
                        existing: *id,
                        prompted,
                    });
                }
                (ConflictAction::ReplaceExisting, Some((id, _))) => {
                    self.host.store.delete_effect(actor, *id).await?;
                    Some(*id)
                }
                _ => None,
            };

            let item = record.to_item(&self.config.category_icons);
            let created = self.host.store.create_effect(actor, item).await?;
            tracing::info!(actor = %actor, effect = %created, name = %record.title(), "Created persistent effect");

            return Ok(match removed {
                Some(removed) => CreateOutcome::Replaced { removed, created },
                None => CreateOutcome::Created(created),
            });
        }
    }

    /// The automated effect of `category` on `actor`, decoded.
    async fn existing(&self, actor: ActorId, category: &str) -> Result<Option<(EffectId, EffectRecord)>> {
        turn::retrieve(self.host.store.as_ref(), actor, None)
            .await?
            .into_iter()
            .find(|e| e.category() == Some(category))
            .map(|stored| stored.record().map(|r| (stored.id, r)))
            .transpose()
    }

    /// Automated effects on an actor, optionally filtered by timing.
    pub async fn retrieve(&self, actor: ActorId, edge: Option<TurnEdge>) -> Result<Vec<StoredEffect>> {
        turn::retrieve(self.host.store.as_ref(), actor, edge).await
    }

    /// Resolve the effects of one token for a turn edge.
    pub async fn process_all_effects(&self, token: TokenId, edge: TurnEdge) -> Result<TurnReport> {
        self.turns.process_token(token, edge).await
    }

    /// Resolve the effects of every token of an actor for a turn edge.
    pub async fn mass_process_all_effects(&self, actor: ActorId, edge: TurnEdge) -> TurnReport {
        self.turns.process_actor(actor, edge).await
    }

    /// Dispatch a combat tracker signal according to the batch setting.
    pub async fn on_turn_event(&self, event: TurnEvent) -> Result<TurnReport> {
        if self.config.batch_process_actors {
            Ok(self.mass_process_all_effects(event.actor_id, event.edge).await)
        } else {
            self.process_all_effects(event.token_id, event.edge).await
        }
    }

    /// Roll the save offered to a player by a save button.
    pub async fn player_save(&self, token: TokenId, effect: EffectId) -> Result<SaveResult> {
        self.saves.player_save(token, effect).await
    }

    /// Link the actors of the targeted tokens to the actor of the first
    /// controlled token, after confirmation. Links join base actors.
    pub async fn link_actors(&self, selection: &Selection) -> Result<LinkOutcome> {
        let source = match selection.controlled.first() {
            Some(id) => self.token(*id)?,
            None => {
                self.host.presenter.warn("You must select a token");
                return Err(AutomationError::NoSelection);
            }
        };
        if selection.targeted.is_empty() {
            self.host.presenter.warn("You must target the tokens to link");
            return Err(AutomationError::NoTarget);
        }

        let mut targets: Vec<TokenRef> = Vec::new();
        for id in &selection.targeted {
            let token = self.token(*id)?;
            if !targets.iter().any(|t| t.base_actor_id == token.base_actor_id) {
                targets.push(token);
            }
        }

        let names: Vec<String> = targets.iter().map(|t| t.name.clone()).collect();
        let prompt = ConfirmPrompt::link_actors(&source.name, &names);
        if !self.host.confirm.confirm(prompt).await {
            return Ok(LinkOutcome::default());
        }

        let source_actor = source.base_actor_id;
        let _guard = self.locks.lock(source_actor).await;
        let mut links = LinkSet::from_ids(self.host.store.linked_actors(source_actor).await?);
        let outcome = links.link(source_actor, targets.iter().map(|t| t.base_actor_id));
        if outcome.rejected_self {
            tracing::warn!(actor = %source_actor, "Refusing to link an actor to itself");
            self.host.presenter.warn("An actor cannot be linked to itself");
        }
        if !outcome.added.is_empty() {
            self.host
                .store
                .set_linked_actors(source_actor, links.into_ids())
                .await?;
            tracing::info!(actor = %source_actor, added = outcome.added.len(), "Linked actors");
        }
        Ok(outcome)
    }

    /// Clear the links of every controlled token's actor. Returns the
    /// number of actors cleared.
    pub async fn unlink_actors(&self, selection: &Selection) -> Result<usize> {
        if selection.controlled.is_empty() {
            self.host.presenter.warn("You must select a token");
            return Err(AutomationError::NoSelection);
        }

        let mut actors: Vec<ActorId> = Vec::new();
        for id in &selection.controlled {
            let actor = self.token(*id)?.base_actor_id;
            if !actors.contains(&actor) {
                actors.push(actor);
            }
        }

        for actor in &actors {
            let _guard = self.locks.lock(*actor).await;
            self.host.store.set_linked_actors(*actor, Vec::new()).await?;
            tracing::info!(actor = %actor, "Unlinked actors");
        }
        Ok(actors.len())
    }

    fn token(&self, id: TokenId) -> Result<TokenRef> {
        self.host.targets.token(id).ok_or_else(|| {
            self.host.presenter.warn("Token not found");
            AutomationError::TokenNotFound(id)
        })
    }
}
