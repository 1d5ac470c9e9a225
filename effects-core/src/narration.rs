//! Messages the engine hands to the presenter.
//!
//! Each message is structured data; `to_html` renders the chat card
//! markup hosts typically post.

use crate::actor::{EffectId, TokenId};
use crate::damage::ResolvedHealthChange;
use serde::{Deserialize, Serialize};

/// Who may see a message or a part of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    All,
    GmOnly,
}

/// Result of one persistent effect resolving on a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narration {
    /// Display name of the speaking actor.
    pub speaker: String,
    pub token_name: String,
    pub category: String,
    pub is_healing: bool,
    pub change: ResolvedHealthChange,
    /// Resistance and weakness details are hidden from players for NPCs.
    pub details: Visibility,
}

impl Narration {
    /// The amount shown to players: healing is reported as a positive number.
    pub fn amount(&self) -> i64 {
        if self.is_healing {
            -self.change.total_change
        } else {
            self.change.total_change
        }
    }

    pub fn headline(&self) -> String {
        let (verb, kind) = if self.is_healing {
            ("receives", "healing")
        } else {
            ("takes", "damage")
        };
        // "persistent healing", not "persistent healing healing"
        if self.category == kind {
            return format!("{} {} {} persistent {}", self.token_name, verb, self.amount(), kind);
        }
        format!(
            "{} {} {} persistent {} {}",
            self.token_name,
            verb,
            self.amount(),
            self.category,
            kind
        )
    }

    pub fn to_html(&self) -> String {
        let mut lines = Vec::new();
        if self.change.resist_value > 0 {
            lines.push(format!(
                "<p class=\"action-content\">{} Resisted</p>",
                self.change.resist_value
            ));
        }
        if self.change.weak_value > 0 {
            lines.push(format!(
                "<p class=\"action-content\">{} Weakness</p>",
                self.change.weak_value
            ));
        }

        let mut html = format!("<p class=\"action-content\">{}</p>", escape(&self.headline()));
        if !lines.is_empty() {
            match self.details {
                Visibility::All => html.push_str(&lines.concat()),
                Visibility::GmOnly => html.push_str(&format!(
                    "<div class=\"automated-effects gm-info\" data-visibility=\"gm\">{}</div>",
                    lines.concat()
                )),
            }
        }
        html
    }
}

/// A "Roll Save" button for a player-controlled token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavePrompt {
    pub speaker: String,
    pub token_id: TokenId,
    pub effect_id: EffectId,
    pub difficulty_class: i64,
}

impl SavePrompt {
    pub fn to_html(&self) -> String {
        format!(
            "<div class=\"message-buttons\" data-visibility=\"all\">\
             <button name=\"savebutton\" data-effect-id=\"{}\" data-token-id=\"{}\" \
             class=\"automated-effects player-save-button\">Roll Save</button></div>",
            self.effect_id, self.token_id
        )
    }
}

/// A save roll being shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveAnnouncement {
    pub speaker: String,
    pub effect_id: EffectId,
    pub total: i64,
    pub difficulty_class: i64,
    pub visibility: Visibility,
}

impl SaveAnnouncement {
    pub fn flavor(&self) -> String {
        format!("DC: {}", self.difficulty_class)
    }

    pub fn succeeded(&self) -> bool {
        self.total >= self.difficulty_class
    }
}

/// Text of a yes/no dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmPrompt {
    pub title: String,
    pub content: String,
    pub default_yes: bool,
}

impl ConfirmPrompt {
    /// Ask whether a conflicting effect should replace the current one.
    pub fn replace_effect(current: (&str, i64), incoming: (&str, i64)) -> Self {
        Self {
            title: "Replace Effect?".to_string(),
            content: format!(
                "<p>Current Effect: {} DC {}</p><p>New Effect: {} DC {}</p>",
                escape(current.0),
                current.1,
                escape(incoming.0),
                incoming.1
            ),
            default_yes: false,
        }
    }

    /// Ask whether actors should be linked to a source actor.
    pub fn link_actors(source: &str, targets: &[String]) -> Self {
        Self {
            title: "Link Actors?".to_string(),
            content: format!(
                "<p>Process the persistent effects of {} on {}'s turn?</p>",
                escape(&targets.join(", ")),
                escape(source)
            ),
            default_yes: true,
        }
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn narration(total_change: i64, is_healing: bool, details: Visibility) -> Narration {
        Narration {
            speaker: "Goblin".into(),
            token_name: "Goblin <1>".into(),
            category: "fire".into(),
            is_healing,
            change: ResolvedHealthChange {
                total_change,
                resist_value: 2,
                weak_value: 0,
                immune: false,
            },
            details,
        }
    }

    #[test]
    fn test_headline() {
        assert_eq!(
            narration(5, false, Visibility::All).headline(),
            "Goblin <1> takes 5 persistent fire damage"
        );
        assert_eq!(
            narration(-4, true, Visibility::All).headline(),
            "Goblin <1> receives 4 persistent fire healing"
        );
    }

    #[test]
    fn test_html_escapes_and_hides_details() {
        let html = narration(5, false, Visibility::GmOnly).to_html();
        assert!(html.contains("Goblin &lt;1&gt;"));
        assert!(html.contains("data-visibility=\"gm\""));
        assert!(html.contains("2 Resisted"));
        assert!(!html.contains("Weakness"));

        let html = narration(5, false, Visibility::All).to_html();
        assert!(!html.contains("gm-info"));
    }

    #[test]
    fn test_save_prompt_html() {
        let prompt = SavePrompt {
            speaker: "Valeros".into(),
            token_id: TokenId::new(),
            effect_id: EffectId::new(),
            difficulty_class: 15,
        };
        let html = prompt.to_html();
        assert!(html.contains(&prompt.token_id.to_string()));
        assert!(html.contains(&prompt.effect_id.to_string()));
    }

    #[test]
    fn test_replace_prompt() {
        let prompt = ConfirmPrompt::replace_effect(("1d6", 15), ("2d4", 12));
        assert!(!prompt.default_yes);
        assert!(prompt.content.contains("Current Effect: 1d6 DC 15"));
        assert!(prompt.content.contains("New Effect: 2d4 DC 12"));
    }
}
