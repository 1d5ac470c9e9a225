//! State behind the "Apply Persistent Effect" form.
//!
//! The presentation layer owns the widgets; it copies their values into
//! an [`EffectForm`] and calls [`EffectForm::submit`].

use crate::automation::{AutomatedEffect, CreateOutcome, Selection};
use crate::config::CategoryIcons;
use crate::effect::{RawEffect, DEFAULT_DIFFICULTY_CLASS};
use crate::error::{AutomationError, Result};
use serde::{Deserialize, Serialize};

/// Category picked when none is checked.
pub const DEFAULT_CATEGORY: &str = "acid";

/// Formula used when the damage field is empty.
pub const DEFAULT_FORMULA: &str = "1d6";

/// The category that makes an effect heal instead of damage.
pub const HEALING_CATEGORY: &str = "healing";

/// One selectable category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryOption {
    pub category: String,
    pub img: Option<String>,
}

/// Raw field values, exactly as typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectForm {
    pub category: Option<String>,
    pub damage: String,
    pub dc: String,
    pub end_of_turn: bool,
    pub duration: String,
    pub silent: bool,
}

impl Default for EffectForm {
    fn default() -> Self {
        Self {
            category: None,
            damage: String::new(),
            dc: String::new(),
            end_of_turn: true,
            duration: String::new(),
            silent: false,
        }
    }
}

impl EffectForm {
    /// Categories to offer, in icon table order, with healing last.
    pub fn categories(icons: &CategoryIcons) -> Vec<CategoryOption> {
        icons
            .categories()
            .filter(|(category, _)| *category != HEALING_CATEGORY)
            .map(|(category, img)| CategoryOption {
                category: category.to_string(),
                img: Some(img.to_string()),
            })
            .chain(std::iter::once(CategoryOption {
                category: HEALING_CATEGORY.to_string(),
                img: icons.get(HEALING_CATEGORY).map(str::to_string),
            }))
            .collect()
    }

    /// Turn field values into effect data, filling in defaults.
    pub fn collect(&self) -> RawEffect {
        let category = self
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CATEGORY)
            .to_string();
        let damage = match self.damage.trim() {
            "" => DEFAULT_FORMULA.to_string(),
            d => d.to_string(),
        };
        let dc = self
            .dc
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|dc| *dc != 0)
            .unwrap_or(DEFAULT_DIFFICULTY_CLASS);
        let duration = self.duration.trim().parse::<i64>().unwrap_or(0);
        let is_healing = category.eq_ignore_ascii_case(HEALING_CATEGORY);

        RawEffect {
            category: Some(category),
            die_formula: Some(damage),
            difficulty_class: Some(dc),
            is_end_of_turn: Some(self.end_of_turn),
            is_healing: Some(is_healing),
            is_silent: Some(self.silent),
            duration: Some(duration),
            rule_elements: None,
        }
    }

    /// Apply the effect to every controlled token.
    ///
    /// Returns one result per token; a failure on one token doesn't stop
    /// the others.
    pub async fn submit(
        &self,
        automation: &AutomatedEffect,
        selection: &Selection,
    ) -> Result<Vec<Result<CreateOutcome>>> {
        if selection.controlled.is_empty() {
            automation.host().presenter.warn("You must select a token");
            return Err(AutomationError::NoSelection);
        }

        let raw = self.collect();
        let mut results = Vec::with_capacity(selection.controlled.len());
        for token in &selection.controlled {
            results.push(automation.create(*token, raw.clone(), false).await);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_defaults() {
        let raw = EffectForm::default().collect();
        assert_eq!(raw.category.as_deref(), Some("acid"));
        assert_eq!(raw.die_formula.as_deref(), Some("1d6"));
        assert_eq!(raw.difficulty_class, Some(15));
        assert_eq!(raw.is_end_of_turn, Some(true));
        assert_eq!(raw.is_healing, Some(false));
        assert_eq!(raw.duration, Some(0));
    }

    #[test]
    fn test_collect_values() {
        let form = EffectForm {
            category: Some("bleed".into()),
            damage: "2d6".into(),
            dc: "20".into(),
            end_of_turn: false,
            duration: "3".into(),
            silent: true,
        };
        let raw = form.collect();
        assert_eq!(raw.die_formula.as_deref(), Some("2d6"));
        assert_eq!(raw.difficulty_class, Some(20));
        assert_eq!(raw.is_end_of_turn, Some(false));
        assert_eq!(raw.duration, Some(3));
        assert_eq!(raw.is_silent, Some(true));
    }

    #[test]
    fn test_healing_category() {
        let form = EffectForm {
            category: Some("Healing".into()),
            dc: "0".into(),
            duration: "soon".into(),
            ..EffectForm::default()
        };
        let raw = form.collect();
        assert_eq!(raw.is_healing, Some(true));
        assert_eq!(raw.difficulty_class, Some(15));
        assert_eq!(raw.duration, Some(0));
    }

    #[test]
    fn test_categories_include_healing() {
        let options = EffectForm::categories(&CategoryIcons::default());
        assert_eq!(options.len(), 16);
        assert!(options.iter().any(|o| o.category == "healing" && o.img.is_none()));
        assert_eq!(options[0].category, "bleed");
        assert_eq!(options[1].category, "fire");
        assert_eq!(options[15].category, "healing");
    }

    #[test]
    fn test_categories_list_healing_once() {
        let icons = CategoryIcons::empty()
            .with_icon("healing", "icons/heal.webp")
            .with_icon("fire", "icons/fire.webp");
        let options = EffectForm::categories(&icons);
        let names: Vec<&str> = options.iter().map(|o| o.category.as_str()).collect();
        assert_eq!(names, vec!["fire", "healing"]);
        assert_eq!(options[1].img.as_deref(), Some("icons/heal.webp"));
    }
}
