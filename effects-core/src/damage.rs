//! Resistance and weakness resolution for persistent effect damage.

use serde::{Deserialize, Serialize};

/// A `{category, value}` entry of a resistance or weakness table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryValue {
    #[serde(rename = "type")]
    pub category: String,
    pub value: i64,
}

impl CategoryValue {
    pub fn new(category: impl Into<String>, value: i64) -> Self {
        Self {
            category: category.into(),
            value,
        }
    }
}

/// Per-actor resistance (DR) and weakness (DV) tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResistanceProfile {
    #[serde(default, rename = "dr")]
    pub resistances: Vec<CategoryValue>,
    #[serde(default, rename = "dv")]
    pub weaknesses: Vec<CategoryValue>,
}

impl ResistanceProfile {
    pub fn with_resistance(mut self, category: impl Into<String>, value: i64) -> Self {
        self.resistances.push(CategoryValue::new(category, value));
        self
    }

    pub fn with_weakness(mut self, category: impl Into<String>, value: i64) -> Self {
        self.weaknesses.push(CategoryValue::new(category, value));
        self
    }

    /// Resistance against `category`; the first matching entry wins.
    pub fn resistance(&self, category: &str) -> i64 {
        lookup(&self.resistances, category)
    }

    /// Weakness to `category`; the first matching entry wins.
    pub fn weakness(&self, category: &str) -> i64 {
        lookup(&self.weaknesses, category)
    }
}

fn lookup(table: &[CategoryValue], category: &str) -> i64 {
    table
        .iter()
        .find(|c| c.category == category)
        .map_or(0, |c| c.value)
}

/// One rolled amount of damage or healing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DamageInstance {
    pub category: String,
    pub raw_value: i64,
    pub is_healing: bool,
}

/// Net effect of a [`DamageInstance`] on an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedHealthChange {
    /// Positive is damage, negative is healing.
    pub total_change: i64,
    pub resist_value: i64,
    pub weak_value: i64,
    /// Always false: immunities are not evaluated.
    pub immune: bool,
}

/// Resolve each instance against the profile, preserving order.
pub fn resolve(instances: &[DamageInstance], profile: &ResistanceProfile) -> Vec<ResolvedHealthChange> {
    instances.iter().map(|i| resolve_one(i, profile)).collect()
}

/// Resolve a single instance.
pub fn resolve_one(instance: &DamageInstance, profile: &ResistanceProfile) -> ResolvedHealthChange {
    if instance.is_healing {
        return ResolvedHealthChange {
            total_change: -instance.raw_value,
            resist_value: 0,
            weak_value: 0,
            immune: false,
        };
    }

    let resist_value = profile.resistance(&instance.category).min(instance.raw_value);
    let weak_value = profile.weakness(&instance.category);

    // Weakness only applies if some damage got through resistance.
    let residual = instance.raw_value - resist_value;
    let total_change = if residual > 0 {
        residual + weak_value
    } else {
        residual
    };

    ResolvedHealthChange {
        total_change,
        resist_value,
        weak_value,
        immune: false,
    }
}
