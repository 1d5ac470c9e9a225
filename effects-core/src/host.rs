//! Capabilities the engine needs from its host.
//!
//! The host owns documents, tokens, dice presentation and dialogs. The
//! engine only talks to it through these traits, so a VTT bridge, a
//! headless simulator and the in-memory [`testing`](crate::testing)
//! collaborators are interchangeable.

use crate::actor::{ActorId, ActorSnapshot, EffectId, HitPoints, TokenId, TokenRef};
use crate::dice::{DiceError, DiceFormula, RollResult};
use crate::effect::{EffectItem, StoredEffect};
use crate::error::StoreError;
use crate::narration::{ConfirmPrompt, Narration, SaveAnnouncement, SavePrompt};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};

/// Document storage for actors, their effect items and link annotations.
#[async_trait]
pub trait EffectStore: Send + Sync {
    /// Read an actor's name, hit points, resistances and ownership.
    async fn actor(&self, actor: ActorId) -> Result<ActorSnapshot, StoreError>;

    /// All effect items embedded in an actor, in item order.
    async fn effects(&self, actor: ActorId) -> Result<Vec<StoredEffect>, StoreError>;

    async fn create_effect(&self, actor: ActorId, item: EffectItem) -> Result<EffectId, StoreError>;

    async fn delete_effect(&self, actor: ActorId, effect: EffectId) -> Result<(), StoreError>;

    async fn update_hit_points(&self, actor: ActorId, hit_points: HitPoints) -> Result<(), StoreError>;

    /// Actors linked from `actor`, in insertion order.
    async fn linked_actors(&self, actor: ActorId) -> Result<Vec<ActorId>, StoreError>;

    async fn set_linked_actors(&self, actor: ActorId, linked: Vec<ActorId>) -> Result<(), StoreError>;
}

/// Token lookup on the current scene.
pub trait TargetResolver: Send + Sync {
    fn token(&self, token: TokenId) -> Option<TokenRef>;

    /// Live tokens whose base actor is `actor`, in placement order.
    fn tokens_for_actor(&self, actor: ActorId) -> Vec<TokenRef>;
}

/// Evaluates dice formulas.
#[async_trait]
pub trait FormulaEvaluator: Send + Sync {
    fn validate(&self, formula: &str) -> Result<(), DiceError>;

    /// Deterministic upper bound of a formula.
    fn evaluate_max(&self, formula: &str) -> Result<i64, DiceError>;

    /// A random roll of the formula.
    async fn evaluate_random(&self, formula: &str) -> Result<RollResult, DiceError>;
}

/// Chat and notification output.
#[async_trait]
pub trait Presenter: Send + Sync {
    /// Post the result of a resolved effect.
    async fn narrate(&self, narration: Narration);

    /// Offer a player the button that later calls `player_save`.
    async fn save_prompt(&self, prompt: SavePrompt);

    /// Show a save roll. Resolves once any dice animation has finished.
    async fn announce_save(&self, announcement: SaveAnnouncement);

    /// Non-fatal notification to the user.
    fn warn(&self, message: &str);
}

/// A yes/no dialog.
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, prompt: ConfirmPrompt) -> bool;
}

/// Bundle of host capabilities.
#[derive(Clone)]
pub struct Host {
    pub store: Arc<dyn EffectStore>,
    pub targets: Arc<dyn TargetResolver>,
    pub dice: Arc<dyn FormulaEvaluator>,
    pub presenter: Arc<dyn Presenter>,
    pub confirm: Arc<dyn Confirm>,
}

/// [`FormulaEvaluator`] backed by the [`dice`](crate::dice) grammar.
pub struct DiceEvaluator {
    rng: Mutex<StdRng>,
}

impl DiceEvaluator {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible rolls.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for DiceEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FormulaEvaluator for DiceEvaluator {
    fn validate(&self, formula: &str) -> Result<(), DiceError> {
        crate::dice::validate(formula)
    }

    fn evaluate_max(&self, formula: &str) -> Result<i64, DiceError> {
        crate::dice::maximize(formula)
    }

    async fn evaluate_random(&self, formula: &str) -> Result<RollResult, DiceError> {
        let parsed = DiceFormula::parse(formula)?;
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        Ok(parsed.roll_with_rng(&mut *rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dice_evaluator() {
        let dice = DiceEvaluator::seeded(3);
        assert!(dice.validate("2d6+1").is_ok());
        assert!(dice.validate("two").is_err());
        assert_eq!(dice.evaluate_max("2d6+1").unwrap(), 13);

        for _ in 0..50 {
            let r = dice.evaluate_random("1d20").await.unwrap();
            assert!((1..=20).contains(&r.total));
        }
    }

    #[tokio::test]
    async fn test_seeded_rolls_repeat() {
        let a = DiceEvaluator::seeded(42);
        let b = DiceEvaluator::seeded(42);
        for _ in 0..10 {
            assert_eq!(
                a.evaluate_random("3d8").await.unwrap().total,
                b.evaluate_random("3d8").await.unwrap().total
            );
        }
    }
}
