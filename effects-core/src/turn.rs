//! Resolving persistent effects at a turn boundary.
//!
//! One run handles one turn-start or turn-end signal:
//!
//! 1. resolve the target tokens (the triggering token, or every token of
//!    the actor in batch mode);
//! 2. enqueue the tokens of actors linked from those targets (one level
//!    deep, never transitively);
//! 3. for every queued token, resolve its effects for this edge one at a
//!    time: roll, apply resistances, update hit points, narrate, save.
//!
//! Tokens sharing a sheet are queued once, so every record resolves at
//! most once per run. A failing record is logged and reported; the run
//! moves on to the next record.

use crate::actor::{ActorId, EffectId, HpChange, TokenId, TokenRef};
use crate::damage::{self, DamageInstance, ResolvedHealthChange};
use crate::effect::{StoredEffect, TurnEdge};
use crate::error::{AutomationError, Result};
use crate::host::{EffectStore, Host};
use crate::locks::ActorLocks;
use crate::narration::{Narration, SavePrompt, Visibility};
use crate::save::{SaveResolver, SaveResult};
use std::collections::HashSet;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    ResolvingTargets,
    ResolvingLinked,
    ProcessingEffects,
}

/// What happened with the save of a damage effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    /// The actor is player-controlled; a save button was offered.
    Deferred,
    Rolled(SaveResult),
    /// The save could not be resolved; the error is in the run's failures.
    Failed,
}

/// One effect that resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectOutcome {
    pub token_id: TokenId,
    pub actor_id: ActorId,
    pub effect_id: EffectId,
    pub category: String,
    pub roll_total: i64,
    pub change: ResolvedHealthChange,
    pub hit_points: HpChange,
    /// `None` for healing effects.
    pub save: Option<SaveStatus>,
}

/// A record (or a whole target) that could not be processed.
#[derive(Debug)]
pub struct ProcessFailure {
    pub token_id: TokenId,
    pub effect_id: Option<EffectId>,
    pub error: AutomationError,
}

/// Everything a run did.
#[derive(Debug)]
pub struct TurnReport {
    pub edge: TurnEdge,
    /// Tokens processed, in order.
    pub targets: Vec<TokenId>,
    pub outcomes: Vec<EffectOutcome>,
    pub failures: Vec<ProcessFailure>,
}

impl TurnReport {
    fn new(edge: TurnEdge) -> Self {
        Self {
            edge,
            targets: Vec::new(),
            outcomes: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Automated effects on an actor, optionally only those resolving on `edge`.
pub async fn retrieve(
    store: &dyn EffectStore,
    actor: ActorId,
    edge: Option<TurnEdge>,
) -> Result<Vec<StoredEffect>> {
    let effects = store.effects(actor).await?;
    Ok(effects
        .into_iter()
        .filter(|e| e.is_automated())
        .filter(|e| match edge {
            Some(edge) => e.is_end_of_turn() == Some(edge == TurnEdge::End),
            None => true,
        })
        .collect())
}

/// Runs turn-boundary processing.
#[derive(Clone)]
pub struct TurnProcessor {
    host: Host,
    locks: ActorLocks,
    saves: SaveResolver,
}

impl TurnProcessor {
    pub fn new(host: Host, locks: ActorLocks, saves: SaveResolver) -> Self {
        Self { host, locks, saves }
    }

    /// Process the effects of a single token (and its linked actors).
    pub async fn process_token(&self, token_id: TokenId, edge: TurnEdge) -> Result<TurnReport> {
        let token = self
            .host
            .targets
            .token(token_id)
            .ok_or(AutomationError::TokenNotFound(token_id))?;
        Ok(self.run(vec![token], edge).await)
    }

    /// Process every live token of an actor (and their linked actors).
    ///
    /// Tokens with their own sheet each resolve their own effects; tokens
    /// sharing the actor's sheet resolve it once.
    pub async fn process_actor(&self, actor_id: ActorId, edge: TurnEdge) -> TurnReport {
        let tokens = self.host.targets.tokens_for_actor(actor_id);
        self.run(tokens, edge).await
    }

    async fn run(&self, primaries: Vec<TokenRef>, edge: TurnEdge) -> TurnReport {
        let mut phase = TurnPhase::Idle;
        let mut report = TurnReport::new(edge);

        enter(&mut phase, TurnPhase::ResolvingTargets);
        let mut queue: Vec<TokenRef> = Vec::new();
        for token in primaries {
            push_unique(&mut queue, token);
        }
        let primary_count = queue.len();

        enter(&mut phase, TurnPhase::ResolvingLinked);
        let mut seen_sources = HashSet::new();
        for i in 0..primary_count {
            let source = queue[i].clone();
            if !seen_sources.insert(source.base_actor_id) {
                continue;
            }
            match self.host.store.linked_actors(source.base_actor_id).await {
                Ok(linked) => {
                    for actor in linked {
                        for token in self.host.targets.tokens_for_actor(actor) {
                            push_unique(&mut queue, token);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(token = %source.name, error = %e, "Could not read linked actors");
                    report.failures.push(ProcessFailure {
                        token_id: source.id,
                        effect_id: None,
                        error: e.into(),
                    });
                }
            }
        }

        enter(&mut phase, TurnPhase::ProcessingEffects);
        for token in &queue {
            report.targets.push(token.id);
            self.process_target(token, edge, &mut report).await;
        }

        enter(&mut phase, TurnPhase::Idle);
        report
    }

    async fn process_target(&self, token: &TokenRef, edge: TurnEdge, report: &mut TurnReport) {
        let _guard = self.locks.lock(token.actor_id).await;

        let effects = match retrieve(self.host.store.as_ref(), token.actor_id, Some(edge)).await {
            Ok(effects) => effects,
            Err(error) => {
                tracing::warn!(token = %token.name, %error, "Could not retrieve effects");
                report.failures.push(ProcessFailure {
                    token_id: token.id,
                    effect_id: None,
                    error,
                });
                return;
            }
        };

        for stored in effects {
            match self.process(token, &stored).await {
                Ok((outcome, save_error)) => {
                    report.outcomes.push(outcome);
                    if let Some(error) = save_error {
                        tracing::warn!(
                            token = %token.name,
                            effect = %stored.id,
                            %error,
                            "Save against persistent effect failed"
                        );
                        report.failures.push(ProcessFailure {
                            token_id: token.id,
                            effect_id: Some(stored.id),
                            error,
                        });
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        token = %token.name,
                        effect = %stored.id,
                        %error,
                        "Skipping persistent effect"
                    );
                    report.failures.push(ProcessFailure {
                        token_id: token.id,
                        effect_id: Some(stored.id),
                        error,
                    });
                }
            }
        }
    }

    /// Resolve one record. Once hit points are written the outcome is
    /// always returned; a save error comes back alongside it.
    async fn process(
        &self,
        token: &TokenRef,
        stored: &StoredEffect,
    ) -> Result<(EffectOutcome, Option<AutomationError>)> {
        let record = stored.record()?;
        let roll = self
            .host
            .dice
            .evaluate_random(&record.magnitude_formula)
            .await?;

        // Re-read per record: the previous record changed this actor's HP.
        let actor = self.host.store.actor(token.actor_id).await?;
        tracing::debug!(token = %token.name, npc = !actor.has_player_owner, roll = %roll, "Processing persistent effect");

        let instance = DamageInstance {
            category: record.category.clone(),
            raw_value: roll.total.max(0),
            is_healing: record.is_healing,
        };
        let change = damage::resolve_one(&instance, &actor.resistances);

        let mut hit_points = actor.hit_points;
        let hp_change = hit_points.apply_change(change.total_change);
        self.host
            .store
            .update_hit_points(actor.id, hit_points)
            .await?;

        if !record.is_silent {
            self.host
                .presenter
                .narrate(Narration {
                    speaker: actor.name.clone(),
                    token_name: token.name.clone(),
                    category: record.category.clone(),
                    is_healing: record.is_healing,
                    change,
                    details: if actor.has_player_owner {
                        Visibility::All
                    } else {
                        Visibility::GmOnly
                    },
                })
                .await;
        }

        let mut save_error = None;
        let save = if record.is_healing {
            None
        } else if actor.has_player_owner {
            self.host
                .presenter
                .save_prompt(SavePrompt {
                    speaker: actor.name.clone(),
                    token_id: token.id,
                    effect_id: stored.id,
                    difficulty_class: record.difficulty_class,
                })
                .await;
            Some(SaveStatus::Deferred)
        } else {
            match self.saves.attempt_save(&actor, stored.id, &record).await {
                Ok(result) => Some(SaveStatus::Rolled(result)),
                Err(error) => {
                    save_error = Some(error);
                    Some(SaveStatus::Failed)
                }
            }
        };

        let outcome = EffectOutcome {
            token_id: token.id,
            actor_id: actor.id,
            effect_id: stored.id,
            category: record.category,
            roll_total: roll.total,
            change,
            hit_points: hp_change,
            save,
        };
        Ok((outcome, save_error))
    }
}

fn enter(phase: &mut TurnPhase, next: TurnPhase) {
    tracing::trace!(from = ?phase, to = ?next, "Turn processing phase");
    *phase = next;
}

/// Queue `token` unless a token on the same sheet is already queued.
fn push_unique(queue: &mut Vec<TokenRef>, token: TokenRef) {
    if !queue.iter().any(|t| t.actor_id == token.actor_id) {
        queue.push(token);
    }
}
