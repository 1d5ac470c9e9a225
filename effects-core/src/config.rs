//! Engine configuration.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::time::Duration;

lazy_static! {
    static ref DEFAULT_ICONS: Vec<(&'static str, &'static str)> = vec![
        ("bleed", "systems/pf2e/icons/spells/blood-vendetta.webp"),
        ("fire", "systems/pf2e/icons/spells/produce-flame.webp"),
        ("acid", "systems/pf2e/icons/spells/cloudkill.webp"),
        ("cold", "systems/pf2e/icons/spells/clinging-ice.webp"),
        ("electricity", "icons/magic/lightning/bolt-strike-purple-pink.webp"),
        ("force", "systems/pf2e/icons/spells/magic-missile.webp"),
        ("mental", "systems/pf2e/icons/spells/modify-memory.webp"),
        ("sonic", "systems/pf2e/icons/spells/cry-of-destruction.webp"),
        ("poison", "icons/magic/nature/root-vine-thorns-poison-green.webp"),
        ("lawful", "systems/pf2e/icons/equipment/adventuring-gear/merchant-scale.webp"),
        ("chaotic", "systems/pf2e/icons/spells/prismatic-wall.webp"),
        ("good", "systems/pf2e/icons/spells/angelic-messenger.webp"),
        ("evil", "systems/pf2e/icons/spells/daemonic-pact.webp"),
        ("positive", "systems/pf2e/icons/spells/positive-luminance.webp"),
        ("negative", "systems/pf2e/icons/spells/bind-soul.webp"),
    ];
}

/// Category → icon path mapping used when creating effect items.
///
/// Categories keep the order they were added in; the form lists them
/// that way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryIcons(Vec<(String, String)>);

impl CategoryIcons {
    /// An empty mapping.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Add a category, or change the icon of one already present.
    pub fn with_icon(mut self, category: impl Into<String>, path: impl Into<String>) -> Self {
        let category = category.into().to_lowercase();
        let path = path.into();
        match self.0.iter_mut().find(|(c, _)| *c == category) {
            Some(entry) => entry.1 = path,
            None => self.0.push((category, path)),
        }
        self
    }

    pub fn get(&self, category: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(c, _)| c == category)
            .map(|(_, path)| path.as_str())
    }

    pub fn categories(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for CategoryIcons {
    fn default() -> Self {
        Self(
            DEFAULT_ICONS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// Configuration for an [`AutomatedEffect`](crate::AutomatedEffect).
#[derive(Debug, Clone)]
pub struct AutomationConfig {
    /// Process every token of an actor on any one token's turn.
    pub batch_process_actors: bool,

    /// Upper bound on waiting for a save roll to be shown.
    pub save_roll_timeout: Duration,

    /// Icons for effect items, by category.
    pub category_icons: CategoryIcons,
}

impl AutomationConfig {
    pub fn new() -> Self {
        Self {
            batch_process_actors: true,
            save_roll_timeout: Duration::from_secs(30),
            category_icons: CategoryIcons::default(),
        }
    }

    /// Read overrides from `EFFECTS_BATCH_PROCESS_ACTORS` and
    /// `EFFECTS_SAVE_TIMEOUT_SECS`. Unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::new();
        if let Some(batch) = std::env::var("EFFECTS_BATCH_PROCESS_ACTORS")
            .ok()
            .and_then(|v| parse_bool(&v))
        {
            config.batch_process_actors = batch;
        }
        if let Some(secs) = std::env::var("EFFECTS_SAVE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            config.save_roll_timeout = Duration::from_secs(secs);
        }
        config
    }

    pub fn with_batch_processing(mut self, enabled: bool) -> Self {
        self.batch_process_actors = enabled;
        self
    }

    pub fn with_save_roll_timeout(mut self, timeout: Duration) -> Self {
        self.save_roll_timeout = timeout;
        self
    }

    pub fn with_category_icons(mut self, icons: CategoryIcons) -> Self {
        self.category_icons = icons;
        self
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
