//! Testing utilities for the automation engine.
//!
//! This module provides in-memory host collaborators:
//! - `MemoryHost` stores actors, tokens, effect items and links
//! - `ScriptedDice` returns queued roll totals before rolling for real
//! - `RecordingPresenter` and `ScriptedConfirm` capture UI traffic
//! - `TestHarness` wires all of them to an `AutomatedEffect`

use crate::actor::{ActorId, ActorSnapshot, EffectId, HitPoints, TokenId, TokenRef};
use crate::automation::AutomatedEffect;
use crate::config::AutomationConfig;
use crate::damage::ResistanceProfile;
use crate::dice::{DiceError, DiceFormula, RollResult};
use crate::effect::{EffectItem, EffectRecord, StoredEffect};
use crate::error::StoreError;
use crate::host::{Confirm, DiceEvaluator, EffectStore, FormulaEvaluator, Host, Presenter, TargetResolver};
use crate::links::{LinkGraph, LinkSet};
use crate::narration::{ConfirmPrompt, Narration, SaveAnnouncement, SavePrompt};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
struct HostState {
    actors: HashMap<ActorId, ActorSnapshot>,
    effects: HashMap<ActorId, Vec<StoredEffect>>,
    items: HashMap<EffectId, EffectItem>,
    links: LinkGraph,
    tokens: Vec<TokenRef>,
    failing_hp_updates: HashSet<ActorId>,
    failing_deletes: HashSet<ActorId>,
}

/// In-memory document store and scene.
#[derive(Default)]
pub struct MemoryHost {
    state: Mutex<HostState>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_actor(&self, actor: ActorSnapshot) -> ActorId {
        let id = actor.id;
        lock(&self.state).actors.insert(id, actor);
        id
    }

    /// Place a token for `actor`; tokens keep placement order.
    pub fn add_token(&self, actor: ActorId, name: impl Into<String>) -> TokenId {
        let token = TokenRef::new(actor, name);
        let id = token.id;
        lock(&self.state).tokens.push(token);
        id
    }

    /// Place a token of `base` with a sheet of its own, copied from the
    /// base actor without its effects. Returns the token's sheet and id.
    pub fn add_unlinked_token(&self, base: ActorId, name: impl Into<String>) -> Option<(ActorId, TokenId)> {
        let mut state = lock(&self.state);
        let mut sheet = state.actors.get(&base)?.clone();
        sheet.id = ActorId::new();
        let token = TokenRef::unlinked(base, sheet.id, name);
        let ids = (sheet.id, token.id);
        state.actors.insert(sheet.id, sheet);
        state.tokens.push(token);
        Some(ids)
    }

    pub fn remove_token(&self, token: TokenId) {
        lock(&self.state).tokens.retain(|t| t.id != token);
    }

    pub fn hit_points(&self, actor: ActorId) -> Option<HitPoints> {
        lock(&self.state).actors.get(&actor).map(|a| a.hit_points)
    }

    pub fn set_hit_points(&self, actor: ActorId, hit_points: HitPoints) {
        if let Some(a) = lock(&self.state).actors.get_mut(&actor) {
            a.hit_points = hit_points;
        }
    }

    pub fn set_resistances(&self, actor: ActorId, resistances: ResistanceProfile) {
        if let Some(a) = lock(&self.state).actors.get_mut(&actor) {
            a.resistances = resistances;
        }
    }

    /// Make `update_hit_points` fail for `actor`.
    pub fn fail_hp_updates(&self, actor: ActorId) {
        lock(&self.state).failing_hp_updates.insert(actor);
    }

    /// Make `delete_effect` fail for `actor`.
    pub fn fail_deletes(&self, actor: ActorId) {
        lock(&self.state).failing_deletes.insert(actor);
    }

    /// Store an item with an arbitrary annotation, bypassing validation.
    pub fn insert_raw_effect(&self, actor: ActorId, name: impl Into<String>, annotation: Option<Value>) -> EffectId {
        let id = EffectId::new();
        lock(&self.state).effects.entry(actor).or_default().push(StoredEffect {
            id,
            name: name.into(),
            annotation,
        });
        id
    }

    /// Store a record directly, without conflict checks.
    pub fn insert_record(&self, actor: ActorId, record: &EffectRecord) -> EffectId {
        let annotation = serde_json::to_value(record).ok();
        self.insert_raw_effect(actor, record.title(), annotation)
    }

    pub fn stored_effects(&self, actor: ActorId) -> Vec<StoredEffect> {
        lock(&self.state).effects.get(&actor).cloned().unwrap_or_default()
    }

    /// Decoded records on an actor, skipping anything undecodable.
    pub fn records(&self, actor: ActorId) -> Vec<EffectRecord> {
        self.stored_effects(actor)
            .iter()
            .filter_map(|e| e.record().ok())
            .collect()
    }

    pub fn has_effect(&self, actor: ActorId, effect: EffectId) -> bool {
        self.stored_effects(actor).iter().any(|e| e.id == effect)
    }

    /// The item data an effect was created with.
    pub fn item(&self, effect: EffectId) -> Option<EffectItem> {
        lock(&self.state).items.get(&effect).cloned()
    }

    pub fn links(&self, actor: ActorId) -> Vec<ActorId> {
        lock(&self.state).links.linked(actor).to_vec()
    }
}

#[async_trait]
impl EffectStore for MemoryHost {
    async fn actor(&self, actor: ActorId) -> Result<ActorSnapshot, StoreError> {
        lock(&self.state)
            .actors
            .get(&actor)
            .cloned()
            .ok_or(StoreError::ActorNotFound(actor))
    }

    async fn effects(&self, actor: ActorId) -> Result<Vec<StoredEffect>, StoreError> {
        let state = lock(&self.state);
        if !state.actors.contains_key(&actor) {
            return Err(StoreError::ActorNotFound(actor));
        }
        Ok(state.effects.get(&actor).cloned().unwrap_or_default())
    }

    async fn create_effect(&self, actor: ActorId, item: EffectItem) -> Result<EffectId, StoreError> {
        let annotation =
            serde_json::to_value(&item.record).map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut state = lock(&self.state);
        if !state.actors.contains_key(&actor) {
            return Err(StoreError::ActorNotFound(actor));
        }
        let id = EffectId::new();
        state.effects.entry(actor).or_default().push(StoredEffect {
            id,
            name: item.name.clone(),
            annotation: Some(annotation),
        });
        state.items.insert(id, item);
        Ok(id)
    }

    async fn delete_effect(&self, actor: ActorId, effect: EffectId) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        if state.failing_deletes.contains(&actor) {
            return Err(StoreError::Backend("effect deletion rejected".to_string()));
        }
        let effects = state.effects.entry(actor).or_default();
        let before = effects.len();
        effects.retain(|e| e.id != effect);
        if effects.len() == before {
            return Err(StoreError::EffectNotFound { actor, effect });
        }
        Ok(())
    }

    async fn update_hit_points(&self, actor: ActorId, hit_points: HitPoints) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        if state.failing_hp_updates.contains(&actor) {
            return Err(StoreError::Backend("hit point update rejected".to_string()));
        }
        let snapshot = state
            .actors
            .get_mut(&actor)
            .ok_or(StoreError::ActorNotFound(actor))?;
        snapshot.hit_points = hit_points;
        Ok(())
    }

    async fn linked_actors(&self, actor: ActorId) -> Result<Vec<ActorId>, StoreError> {
        Ok(lock(&self.state).links.linked(actor).to_vec())
    }

    async fn set_linked_actors(&self, actor: ActorId, linked: Vec<ActorId>) -> Result<(), StoreError> {
        lock(&self.state).links.set(actor, LinkSet::from_ids(linked));
        Ok(())
    }
}

impl TargetResolver for MemoryHost {
    fn token(&self, token: TokenId) -> Option<TokenRef> {
        lock(&self.state).tokens.iter().find(|t| t.id == token).cloned()
    }

    fn tokens_for_actor(&self, actor: ActorId) -> Vec<TokenRef> {
        lock(&self.state)
            .tokens
            .iter()
            .filter(|t| t.base_actor_id == actor)
            .cloned()
            .collect()
    }
}

/// Dice that return queued totals, then fall back to seeded rolls.
pub struct ScriptedDice {
    queued: Mutex<VecDeque<i64>>,
    rolled: Mutex<Vec<String>>,
    fallback: DiceEvaluator,
}

impl ScriptedDice {
    pub fn new() -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            rolled: Mutex::new(Vec::new()),
            fallback: DiceEvaluator::seeded(0),
        }
    }

    /// Queue totals for the next random rolls, in order.
    pub fn queue(&self, totals: impl IntoIterator<Item = i64>) {
        lock(&self.queued).extend(totals);
    }

    /// Formulas rolled so far.
    pub fn rolled(&self) -> Vec<String> {
        lock(&self.rolled).clone()
    }
}

impl Default for ScriptedDice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FormulaEvaluator for ScriptedDice {
    fn validate(&self, formula: &str) -> Result<(), DiceError> {
        self.fallback.validate(formula)
    }

    fn evaluate_max(&self, formula: &str) -> Result<i64, DiceError> {
        self.fallback.evaluate_max(formula)
    }

    async fn evaluate_random(&self, formula: &str) -> Result<RollResult, DiceError> {
        let parsed = DiceFormula::parse(formula)?;
        lock(&self.rolled).push(parsed.original.clone());
        let queued = lock(&self.queued).pop_front();
        match queued {
            Some(total) => Ok(RollResult::from_total(parsed.original, total)),
            None => self.fallback.evaluate_random(formula).await,
        }
    }
}

/// Presenter that records everything it is shown.
#[derive(Default)]
pub struct RecordingPresenter {
    narrations: Mutex<Vec<Narration>>,
    save_prompts: Mutex<Vec<SavePrompt>>,
    announcements: Mutex<Vec<SaveAnnouncement>>,
    warnings: Mutex<Vec<String>>,
    stall_announcements: AtomicBool,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never finish save animations, to exercise the timeout.
    pub fn stall_announcements(&self) {
        self.stall_announcements.store(true, Ordering::SeqCst);
    }

    pub fn narrations(&self) -> Vec<Narration> {
        lock(&self.narrations).clone()
    }

    pub fn save_prompts(&self) -> Vec<SavePrompt> {
        lock(&self.save_prompts).clone()
    }

    pub fn announcements(&self) -> Vec<SaveAnnouncement> {
        lock(&self.announcements).clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        lock(&self.warnings).clone()
    }
}

#[async_trait]
impl Presenter for RecordingPresenter {
    async fn narrate(&self, narration: Narration) {
        lock(&self.narrations).push(narration);
    }

    async fn save_prompt(&self, prompt: SavePrompt) {
        lock(&self.save_prompts).push(prompt);
    }

    async fn announce_save(&self, announcement: SaveAnnouncement) {
        lock(&self.announcements).push(announcement);
        if self.stall_announcements.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }

    fn warn(&self, message: &str) {
        lock(&self.warnings).push(message.to_string());
    }
}

/// Dialog with queued answers; answers "no" when the queue is empty.
#[derive(Default)]
pub struct ScriptedConfirm {
    answers: Mutex<VecDeque<bool>>,
    prompts: Mutex<Vec<ConfirmPrompt>>,
    hold: Mutex<Option<oneshot::Receiver<()>>>,
}

impl ScriptedConfirm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(&self, yes: bool) {
        lock(&self.answers).push_back(yes);
    }

    pub fn prompts(&self) -> Vec<ConfirmPrompt> {
        lock(&self.prompts).clone()
    }

    /// Keep the next dialog open until the returned sender fires (or is
    /// dropped).
    pub fn hold(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *lock(&self.hold) = Some(rx);
        tx
    }
}

#[async_trait]
impl Confirm for ScriptedConfirm {
    async fn confirm(&self, prompt: ConfirmPrompt) -> bool {
        lock(&self.prompts).push(prompt);
        let held = lock(&self.hold).take();
        if let Some(release) = held {
            let _ = release.await;
        }
        lock(&self.answers).pop_front().unwrap_or(false)
    }
}

/// In-memory collaborators wired to an [`AutomatedEffect`].
pub struct TestHarness {
    pub host: Arc<MemoryHost>,
    pub dice: Arc<ScriptedDice>,
    pub presenter: Arc<RecordingPresenter>,
    pub confirm: Arc<ScriptedConfirm>,
    pub automation: AutomatedEffect,
}

impl TestHarness {
    /// A harness with the default configuration (batch processing on).
    pub fn new() -> Self {
        Self::with_config(AutomationConfig::default())
    }

    pub fn with_config(config: AutomationConfig) -> Self {
        let host = Arc::new(MemoryHost::new());
        let dice = Arc::new(ScriptedDice::new());
        let presenter = Arc::new(RecordingPresenter::new());
        let confirm = Arc::new(ScriptedConfirm::new());
        let automation = AutomatedEffect::new(
            Host {
                store: host.clone(),
                targets: host.clone(),
                dice: dice.clone(),
                presenter: presenter.clone(),
                confirm: confirm.clone(),
            },
            config,
        );
        Self {
            host,
            dice,
            presenter,
            confirm,
            automation,
        }
    }

    /// Add a non-player actor with one token.
    pub fn add_npc(&self, name: &str, max_hp: i64) -> (ActorId, TokenId) {
        let actor = self.host.add_actor(ActorSnapshot::new(name, HitPoints::new(max_hp)));
        (actor, self.host.add_token(actor, name))
    }

    /// Add a player-owned actor with one token.
    pub fn add_player(&self, name: &str, max_hp: i64) -> (ActorId, TokenId) {
        let actor = self
            .host
            .add_actor(ActorSnapshot::new(name, HitPoints::new(max_hp)).player_owned());
        (actor, self.host.add_token(actor, name))
    }

    /// Queue totals for upcoming rolls (magnitudes and saves alike).
    pub fn queue_rolls(&self, totals: impl IntoIterator<Item = i64>) -> &Self {
        self.dice.queue(totals);
        self
    }

    pub fn hp(&self, actor: ActorId) -> HitPoints {
        self.host
            .hit_points(actor)
            .unwrap_or_else(|| panic!("no actor {actor}"))
    }

    pub fn records(&self, actor: ActorId) -> Vec<EffectRecord> {
        self.host.records(actor)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert an actor's regular and temporary hit points.
#[track_caller]
pub fn assert_hp(harness: &TestHarness, actor: ActorId, current: i64, temporary: i64) {
    let hp = harness.hp(actor);
    assert_eq!(
        (hp.current, hp.temporary),
        (current, temporary),
        "Expected HP {current} (+{temporary} temp), got {} (+{} temp)",
        hp.current,
        hp.temporary
    );
}

/// Assert how many automated effects an actor carries.
#[track_caller]
pub fn assert_effect_count(harness: &TestHarness, actor: ActorId, expected: usize) {
    let actual = harness
        .host
        .stored_effects(actor)
        .iter()
        .filter(|e| e.is_automated())
        .count();
    assert_eq!(actual, expected, "Expected {expected} effects, found {actual}");
}
