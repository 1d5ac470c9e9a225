//! Error types for the automation engine.

use crate::actor::{ActorId, EffectId, TokenId};
use crate::dice::DiceError;
use thiserror::Error;

/// Errors from host store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Actor not found: {0}")]
    ActorNotFound(ActorId),

    #[error("Effect {effect} not found on actor {actor}")]
    EffectNotFound { actor: ActorId, effect: EffectId },

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Errors from automation operations.
///
/// All of these are recoverable: they abort the one operation that
/// raised them and never a whole turn.
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("Invalid effect: {0}")]
    InvalidEffect(String),

    #[error("Effect {0} was already saved against or removed")]
    AlreadyResolved(EffectId),

    #[error("No token selected")]
    NoSelection,

    #[error("No target selected")]
    NoTarget,

    #[error("Token not found: {0}")]
    TokenNotFound(TokenId),

    #[error("Corrupted effect record {id}: {source}")]
    CorruptedRecord {
        id: EffectId,
        #[source]
        source: serde_json::Error,
    },

    #[error("Dice error: {0}")]
    Dice(#[from] DiceError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl AutomationError {
    /// Conditions the user caused and should be told about, as opposed
    /// to failures of the host.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            AutomationError::InvalidEffect(_)
                | AutomationError::AlreadyResolved(_)
                | AutomationError::NoSelection
                | AutomationError::NoTarget
        )
    }
}

pub type Result<T, E = AutomationError> = std::result::Result<T, E>;
