//! Deciding what happens when an effect of an already-present category
//! is applied again.

use crate::effect::EffectRecord;
use crate::error::Result;
use crate::host::FormulaEvaluator;
use serde::{Deserialize, Serialize};

/// Outcome of comparing an incoming effect against the existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictAction {
    /// No conflict: create the incoming effect.
    CreateNew,
    /// Delete the existing effect, then create the incoming one.
    ReplaceExisting,
    /// Ignore the incoming effect.
    KeepExisting,
    /// Better on one axis, worse on the other: ask the user.
    PromptUser,
}

impl ConflictAction {
    /// Settle a [`ConflictAction::PromptUser`] with the user's answer.
    pub fn settle(self, replace: bool) -> ConflictAction {
        match self {
            ConflictAction::PromptUser if replace => ConflictAction::ReplaceExisting,
            ConflictAction::PromptUser => ConflictAction::KeepExisting,
            other => other,
        }
    }
}

/// The two axes effects are compared on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectStrength {
    /// Magnitude with every die at its maximum.
    pub max_amount: i64,
    pub difficulty_class: i64,
}

impl EffectStrength {
    pub fn new(max_amount: i64, difficulty_class: i64) -> Self {
        Self {
            max_amount,
            difficulty_class,
        }
    }

    /// Measure a record with the given evaluator.
    pub fn of(record: &EffectRecord, evaluator: &dyn FormulaEvaluator) -> Result<Self> {
        Ok(Self {
            max_amount: evaluator.evaluate_max(&record.magnitude_formula)?,
            difficulty_class: record.difficulty_class,
        })
    }
}

/// Compare `incoming` against the `existing` effect of the same category.
pub fn resolve(
    existing: Option<EffectStrength>,
    incoming: EffectStrength,
    force: bool,
) -> ConflictAction {
    let Some(existing) = existing else {
        return ConflictAction::CreateNew;
    };
    if force {
        // The existing record stays; two records of the category coexist.
        return ConflictAction::CreateNew;
    }

    let more_amount = incoming.max_amount > existing.max_amount;
    let higher_dc = incoming.difficulty_class > existing.difficulty_class;
    if !(more_amount || higher_dc) {
        return ConflictAction::KeepExisting;
    }

    if incoming.max_amount >= existing.max_amount
        && incoming.difficulty_class >= existing.difficulty_class
    {
        ConflictAction::ReplaceExisting
    } else {
        ConflictAction::PromptUser
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(max: i64, dc: i64) -> EffectStrength {
        EffectStrength::new(max, dc)
    }

    #[test]
    fn test_no_existing() {
        assert_eq!(resolve(None, s(1, 1), false), ConflictAction::CreateNew);
    }

    #[test]
    fn test_force_always_creates() {
        assert_eq!(resolve(Some(s(10, 30)), s(1, 1), true), ConflictAction::CreateNew);
    }

    #[test]
    fn test_better_amount_same_dc_replaces() {
        assert_eq!(decide(Some(s(6, 15)), s(8, 15)), ConflictAction::ReplaceExisting);
    }

    #[test]
    fn test_mixed_prompts() {
        assert_eq!(decide(Some(s(6, 15)), s(8, 12)), ConflictAction::PromptUser);
        assert_eq!(decide(Some(s(6, 15)), s(4, 20)), ConflictAction::PromptUser);
    }

    #[test]
    fn test_worse_is_kept() {
        assert_eq!(decide(Some(s(6, 15)), s(4, 15)), ConflictAction::KeepExisting);
        assert_eq!(decide(Some(s(6, 15)), s(6, 15)), ConflictAction::KeepExisting);
        assert_eq!(decide(Some(s(6, 15)), s(4, 12)), ConflictAction::KeepExisting);
    }

    #[test]
    fn test_higher_dc_same_amount_replaces() {
        assert_eq!(decide(Some(s(6, 15)), s(6, 18)), ConflictAction::ReplaceExisting);
    }

    #[test]
    fn test_settle() {
        assert_eq!(ConflictAction::PromptUser.settle(true), ConflictAction::ReplaceExisting);
        assert_eq!(ConflictAction::PromptUser.settle(false), ConflictAction::KeepExisting);
        assert_eq!(ConflictAction::CreateNew.settle(false), ConflictAction::CreateNew);
    }

    fn decide(existing: Option<EffectStrength>, incoming: EffectStrength) -> ConflictAction {
        resolve(existing, incoming, false)
    }
}
