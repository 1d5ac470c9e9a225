//! Persistent effect records and the items that carry them.
//!
//! An [`EffectRecord`] is the annotation stored on an effect item of an
//! actor. Records are built once through [`EffectRecord::normalize`] and
//! never mutated afterwards; replacing one means deleting the item and
//! creating a new one.

use crate::actor::EffectId;
use crate::config::CategoryIcons;
use crate::dice::{self, DiceError};
use crate::error::AutomationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// DC used when none is given.
pub const DEFAULT_DIFFICULTY_CLASS: i64 = 15;

/// Highest DC a record may carry.
pub const MAX_DIFFICULTY_CLASS: i64 = 255;

/// Longest duration a record may carry, in rounds.
pub const MAX_DURATION_ROUNDS: u64 = 52_564_442_400;

/// Unvalidated effect data as submitted by a form or macro.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEffect {
    #[serde(rename = "type")]
    pub category: Option<String>,
    pub die_formula: Option<String>,
    pub difficulty_class: Option<i64>,
    pub is_end_of_turn: Option<bool>,
    pub is_healing: Option<bool>,
    pub is_silent: Option<bool>,
    pub duration: Option<i64>,
    pub rule_elements: Option<Vec<Value>>,
}

impl RawEffect {
    pub fn new(category: impl Into<String>, die_formula: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            die_formula: Some(die_formula.into()),
            ..Self::default()
        }
    }

    pub fn with_dc(mut self, dc: i64) -> Self {
        self.difficulty_class = Some(dc);
        self
    }

    pub fn at_turn_start(mut self) -> Self {
        self.is_end_of_turn = Some(false);
        self
    }

    pub fn at_turn_end(mut self) -> Self {
        self.is_end_of_turn = Some(true);
        self
    }

    pub fn healing(mut self) -> Self {
        self.is_healing = Some(true);
        self
    }

    pub fn silent(mut self) -> Self {
        self.is_silent = Some(true);
        self
    }

    pub fn with_duration(mut self, rounds: i64) -> Self {
        self.duration = Some(rounds);
        self
    }

    pub fn with_rule_element(mut self, rule: Value) -> Self {
        self.rule_elements.get_or_insert_with(Vec::new).push(rule);
        self
    }

    /// Normalize against the built-in dice grammar.
    pub fn normalize(self) -> Result<EffectRecord, AutomationError> {
        EffectRecord::normalize(self, dice::validate)
    }
}

/// A validated persistent effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectRecord {
    #[serde(rename = "type")]
    pub category: String,
    #[serde(rename = "dieFormula")]
    pub magnitude_formula: String,
    pub difficulty_class: i64,
    pub is_end_of_turn: bool,
    pub is_healing: bool,
    #[serde(default)]
    pub is_silent: bool,
    #[serde(rename = "duration")]
    pub duration_rounds: u64,
    #[serde(default)]
    pub rule_elements: Vec<Value>,
}

impl EffectRecord {
    /// Validate and clean raw effect data.
    ///
    /// `validate` checks the magnitude formula; the host's random source
    /// decides which formulas it accepts.
    pub fn normalize<F>(raw: RawEffect, validate: F) -> Result<Self, AutomationError>
    where
        F: FnOnce(&str) -> Result<(), DiceError>,
    {
        let category = raw
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AutomationError::InvalidEffect("missing effect type".to_string()))?
            .to_lowercase();

        let formula = raw
            .die_formula
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_lowercase();
        validate(&formula)
            .map_err(|e| AutomationError::InvalidEffect(format!("bad formula '{formula}': {e}")))?;

        Ok(Self {
            category,
            magnitude_formula: formula,
            difficulty_class: raw
                .difficulty_class
                .unwrap_or(DEFAULT_DIFFICULTY_CLASS)
                .min(MAX_DIFFICULTY_CLASS),
            is_end_of_turn: raw.is_end_of_turn.unwrap_or(true),
            is_healing: raw.is_healing.unwrap_or(false),
            is_silent: raw.is_silent.unwrap_or(false),
            duration_rounds: raw
                .duration
                .unwrap_or(0)
                .clamp(0, MAX_DURATION_ROUNDS as i64) as u64,
            rule_elements: raw.rule_elements.unwrap_or_default(),
        })
    }

    /// Whether this record resolves on the given turn edge.
    pub fn fires_on(&self, edge: TurnEdge) -> bool {
        self.is_end_of_turn == (edge == TurnEdge::End)
    }

    pub fn kind(&self) -> &'static str {
        if self.is_healing {
            "healing"
        } else {
            "damage"
        }
    }

    /// Item name, e.g. `Persistent damage (2D6 fire DC20)`.
    pub fn title(&self) -> String {
        let dc = if self.difficulty_class == DEFAULT_DIFFICULTY_CLASS {
            String::new()
        } else {
            format!(" DC{}", self.difficulty_class)
        };
        format!(
            "Persistent {} ({} {}{})",
            self.kind(),
            self.magnitude_formula.to_uppercase(),
            self.category,
            dc
        )
    }

    /// Build the host item that carries this record.
    pub fn to_item(&self, icons: &CategoryIcons) -> EffectItem {
        EffectItem {
            name: self.title(),
            description: "Automated Persistent Effect.".to_string(),
            duration: ItemDuration {
                expiry: if self.is_end_of_turn {
                    Expiry::TurnEnd
                } else {
                    Expiry::TurnBegin
                },
                unit: if self.duration_rounds > 0 {
                    DurationUnit::Rounds
                } else {
                    DurationUnit::Unlimited
                },
                value: self.duration_rounds,
                sustained: false,
            },
            rules: self.rule_elements.clone(),
            show_token_icon: !self.is_silent,
            img: icons.get(&self.category).map(str::to_string),
            record: self.clone(),
        }
    }
}

/// The turn boundary an effect resolves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TurnEdge {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Expiry {
    TurnBegin,
    TurnEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Rounds,
    Unlimited,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDuration {
    pub expiry: Expiry,
    pub unit: DurationUnit,
    pub value: u64,
    pub sustained: bool,
}

/// Everything the host needs to create an effect item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectItem {
    pub name: String,
    pub description: String,
    pub duration: ItemDuration,
    pub rules: Vec<Value>,
    pub show_token_icon: bool,
    pub img: Option<String>,
    /// Stored as the item's namespaced annotation.
    pub record: EffectRecord,
}

/// An effect item as read back from the store.
///
/// The annotation is kept as raw JSON so a corrupted record only fails
/// when it is actually used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEffect {
    pub id: EffectId,
    pub name: String,
    pub annotation: Option<Value>,
}

impl StoredEffect {
    /// Whether this item carries an automation annotation at all.
    pub fn is_automated(&self) -> bool {
        self.annotation.is_some()
    }

    /// The timing flag, readable even when the rest is corrupted.
    pub fn is_end_of_turn(&self) -> Option<bool> {
        self.annotation
            .as_ref()?
            .get("isEndOfTurn")
            .and_then(Value::as_bool)
    }

    /// The category key, readable even when the rest is corrupted.
    pub fn category(&self) -> Option<&str> {
        self.annotation.as_ref()?.get("type").and_then(Value::as_str)
    }

    /// Decode the annotation.
    pub fn record(&self) -> Result<EffectRecord, AutomationError> {
        let annotation = self
            .annotation
            .clone()
            .ok_or_else(|| AutomationError::InvalidEffect(format!("item {} is not automated", self.id)))?;
        serde_json::from_value(annotation).map_err(|source| AutomationError::CorruptedRecord {
            id: self.id,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_defaults() {
        let record = RawEffect::new("Fire", "2D6").normalize().unwrap();
        assert_eq!(record.category, "fire");
        assert_eq!(record.magnitude_formula, "2d6");
        assert_eq!(record.difficulty_class, 15);
        assert!(record.is_end_of_turn);
        assert!(!record.is_healing);
        assert!(!record.is_silent);
        assert_eq!(record.duration_rounds, 0);
        assert!(record.rule_elements.is_empty());
    }

    #[test]
    fn test_normalize_clamps() {
        let record = RawEffect::new("bleed", "1d4")
            .with_dc(900)
            .with_duration(i64::MAX)
            .normalize()
            .unwrap();
        assert_eq!(record.difficulty_class, 255);
        assert_eq!(record.duration_rounds, MAX_DURATION_ROUNDS);

        let record = RawEffect::new("bleed", "1d4")
            .with_duration(-3)
            .normalize()
            .unwrap();
        assert_eq!(record.duration_rounds, 0);
    }

    #[test]
    fn test_normalize_rejects_missing_category() {
        let raw = RawEffect {
            die_formula: Some("1d6".into()),
            ..RawEffect::default()
        };
        assert!(matches!(raw.normalize(), Err(AutomationError::InvalidEffect(_))));
        assert!(matches!(
            RawEffect::new("  ", "1d6").normalize(),
            Err(AutomationError::InvalidEffect(_))
        ));
    }

    #[test]
    fn test_normalize_rejects_bad_formula() {
        assert!(matches!(
            RawEffect::new("fire", "lots").normalize(),
            Err(AutomationError::InvalidEffect(_))
        ));
        let raw = RawEffect {
            category: Some("fire".into()),
            ..RawEffect::default()
        };
        assert!(raw.normalize().is_err());
    }

    #[test]
    fn test_rule_elements_pass_through() {
        let rule = json!({"key": "FlatModifier", "selector": "ac", "value": -1});
        let record = RawEffect::new("acid", "1d6")
            .with_rule_element(rule.clone())
            .normalize()
            .unwrap();
        assert_eq!(record.rule_elements, vec![rule]);
    }

    #[test]
    fn test_title() {
        let record = RawEffect::new("fire", "2d6").normalize().unwrap();
        assert_eq!(record.title(), "Persistent damage (2D6 fire)");
        let record = RawEffect::new("positive", "1d8")
            .healing()
            .with_dc(20)
            .normalize()
            .unwrap();
        assert_eq!(record.title(), "Persistent healing (1D8 positive DC20)");
    }

    #[test]
    fn test_to_item() {
        let icons = CategoryIcons::default();
        let item = RawEffect::new("bleed", "1d6")
            .at_turn_start()
            .with_duration(3)
            .silent()
            .normalize()
            .unwrap()
            .to_item(&icons);
        assert_eq!(item.duration.expiry, Expiry::TurnBegin);
        assert_eq!(item.duration.unit, DurationUnit::Rounds);
        assert_eq!(item.duration.value, 3);
        assert!(!item.show_token_icon);
        assert!(item.img.is_some());
    }

    #[test]
    fn test_annotation_roundtrip_keys() {
        let record = RawEffect::new("poison", "1d10").normalize().unwrap();
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "poison");
        assert_eq!(value["dieFormula"], "1d10");
        assert_eq!(value["isEndOfTurn"], true);

        let stored = StoredEffect {
            id: EffectId::new(),
            name: record.title(),
            annotation: Some(value),
        };
        assert_eq!(stored.record().unwrap(), record);
        assert_eq!(stored.is_end_of_turn(), Some(true));
        assert_eq!(stored.category(), Some("poison"));
    }

    #[test]
    fn test_corrupted_annotation() {
        let stored = StoredEffect {
            id: EffectId::new(),
            name: "Broken".into(),
            annotation: Some(json!({"type": "fire", "isEndOfTurn": false})),
        };
        assert_eq!(stored.is_end_of_turn(), Some(false));
        assert!(matches!(
            stored.record(),
            Err(AutomationError::CorruptedRecord { .. })
        ));
    }

    #[test]
    fn test_fires_on() {
        let record = RawEffect::new("fire", "1d6").normalize().unwrap();
        assert!(record.fires_on(TurnEdge::End));
        assert!(!record.fires_on(TurnEdge::Start));
    }
}
