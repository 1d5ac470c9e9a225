//! Actors, tokens and hit points as seen by the automation engine.

use crate::damage::ResistanceProfile;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identifies an actor (the sheet shared by all of its tokens).
    ActorId
);
id_type!(
    /// Identifies one placed token instance of an actor.
    TokenId
);
id_type!(
    /// Identifies an effect item embedded in an actor.
    EffectId
);

/// Hit point pools of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitPoints {
    pub current: i64,
    pub maximum: i64,
    pub temporary: i64,
}

impl HitPoints {
    pub fn new(maximum: i64) -> Self {
        Self {
            current: maximum,
            maximum,
            temporary: 0,
        }
    }

    pub fn with_temporary(mut self, temporary: i64) -> Self {
        self.temporary = temporary;
        self
    }

    /// Apply a signed change (positive = damage, negative = healing).
    ///
    /// Damage is absorbed by temporary hit points first. Healing only
    /// ever restores regular hit points. Neither pool is clamped here.
    pub fn apply_change(&mut self, total_change: i64) -> HpChange {
        let before = *self;

        if total_change >= 0 && self.temporary > 0 {
            if self.temporary >= total_change {
                self.temporary -= total_change;
                return HpChange {
                    before,
                    after: *self,
                };
            }
            let remainder = total_change - self.temporary;
            self.temporary = 0;
            self.current -= remainder;
        } else {
            self.current -= total_change;
        }

        HpChange {
            before,
            after: *self,
        }
    }
}

/// Before/after snapshot of an HP mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpChange {
    pub before: HitPoints,
    pub after: HitPoints,
}

impl HpChange {
    pub fn temporary_lost(&self) -> i64 {
        self.before.temporary - self.after.temporary
    }

    pub fn regular_delta(&self) -> i64 {
        self.after.current - self.before.current
    }
}

/// The parts of an actor the engine reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorSnapshot {
    pub id: ActorId,
    pub name: String,
    pub hit_points: HitPoints,
    pub resistances: ResistanceProfile,
    /// Player-controlled actors roll their own saves.
    pub has_player_owner: bool,
}

impl ActorSnapshot {
    pub fn new(name: impl Into<String>, hit_points: HitPoints) -> Self {
        Self {
            id: ActorId::new(),
            name: name.into(),
            hit_points,
            resistances: ResistanceProfile::default(),
            has_player_owner: false,
        }
    }

    pub fn with_resistances(mut self, resistances: ResistanceProfile) -> Self {
        self.resistances = resistances;
        self
    }

    pub fn player_owned(mut self) -> Self {
        self.has_player_owner = true;
        self
    }
}

/// A placed token and the actor it represents.
///
/// A token either shares its base actor's sheet or carries a sheet of its
/// own (an unlinked token). Hit points and effects live on `actor_id`;
/// links and "every token of an actor" go through `base_actor_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRef {
    pub id: TokenId,
    /// The sheet this token reads and writes.
    pub actor_id: ActorId,
    pub base_actor_id: ActorId,
    pub name: String,
}

impl TokenRef {
    /// A token sharing the sheet of `actor_id`.
    pub fn new(actor_id: ActorId, name: impl Into<String>) -> Self {
        Self {
            id: TokenId::new(),
            actor_id,
            base_actor_id: actor_id,
            name: name.into(),
        }
    }

    /// A token of `base_actor_id` with its own sheet `actor_id`.
    pub fn unlinked(base_actor_id: ActorId, actor_id: ActorId, name: impl Into<String>) -> Self {
        Self {
            id: TokenId::new(),
            actor_id,
            base_actor_id,
            name: name.into(),
        }
    }

    pub fn shares_sheet(&self) -> bool {
        self.actor_id == self.base_actor_id
    }
}
