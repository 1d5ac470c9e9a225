//! Persistent damage and healing automation for turn-based combat.
//!
//! This crate provides:
//! - Creating persistent effects on actors, with same-category conflict handling
//! - Turn-start and turn-end resolution: roll, resistances, hit points, narration
//! - Flat DC saving throws that remove an effect, rolled at once or deferred to players
//! - Actor links, so one combatant's turn also resolves effects on its links
//!
//! The engine reaches its host (documents, tokens, dice, chat, dialogs)
//! through the traits in [`host`].
//!
//! # Quick Start
//!
//! ```ignore
//! use effects_core::{AutomatedEffect, AutomationConfig, RawEffect, TurnEdge, TurnEvent};
//!
//! async fn on_bleed(automation: &AutomatedEffect, event: TurnEvent) -> effects_core::Result<()> {
//!     let raw = RawEffect::new("bleed", "1d6").with_dc(15).at_turn_end();
//!     automation.create(event.token_id, raw, false).await?;
//!
//!     let report = automation.on_turn_event(event).await?;
//!     for outcome in &report.outcomes {
//!         println!("{} took {}", outcome.category, outcome.change.total_change);
//!     }
//!     Ok(())
//! }
//! ```

pub mod actor;
pub mod automation;
pub mod config;
pub mod conflict;
pub mod damage;
pub mod dice;
pub mod effect;
pub mod error;
pub mod form;
pub mod host;
pub mod links;
pub mod locks;
pub mod narration;
pub mod save;
pub mod testing;
pub mod turn;

// Primary public API
pub use actor::{ActorId, ActorSnapshot, EffectId, HitPoints, TokenId, TokenRef};
pub use automation::{AutomatedEffect, CreateOutcome, Selection, TurnEvent};
pub use config::{AutomationConfig, CategoryIcons};
pub use damage::{DamageInstance, ResistanceProfile, ResolvedHealthChange};
pub use effect::{EffectRecord, RawEffect, StoredEffect, TurnEdge};
pub use error::{AutomationError, Result, StoreError};
pub use form::EffectForm;
pub use host::{Confirm, DiceEvaluator, EffectStore, FormulaEvaluator, Host, Presenter, TargetResolver};
pub use save::{SaveOutcome, SaveResult};
pub use testing::TestHarness;
pub use turn::{EffectOutcome, SaveStatus, TurnReport};
