//! Saving throws and actor links.

use effects_core::automation::Selection;
use effects_core::effect::{RawEffect, TurnEdge};
use effects_core::narration::Visibility;
use effects_core::save::SaveOutcome;
use effects_core::testing::{assert_effect_count, assert_hp, TestHarness};
use effects_core::turn::SaveStatus;
use effects_core::{AutomationConfig, AutomationError, EffectId, TokenId};
use std::time::Duration;

fn setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn apply(harness: &TestHarness, token: TokenId, raw: RawEffect) -> EffectId {
    harness
        .automation
        .create(token, raw, false)
        .await
        .expect("create should succeed")
        .created()
        .expect("effect should be created")
}

// =============================================================================
// Automatic saves
// =============================================================================

#[tokio::test]
async fn test_npc_save_at_dc_removes_effect() {
    setup();
    let harness = TestHarness::new();
    let (actor, token) = harness.add_npc("Goblin", 20);
    let effect = apply(&harness, token, RawEffect::new("fire", "1d6")).await;

    harness.queue_rolls([3, 15]);
    let report = harness
        .automation
        .process_all_effects(token, TurnEdge::End)
        .await
        .unwrap();

    assert!(matches!(
        report.outcomes[0].save,
        Some(SaveStatus::Rolled(result)) if result.outcome == SaveOutcome::Success
    ));
    assert!(!harness.host.has_effect(actor, effect));
    assert_hp(&harness, actor, 17, 0);

    let announcements = harness.presenter.announcements();
    assert_eq!(announcements.len(), 1);
    assert_eq!(announcements[0].flavor(), "DC: 15");
    assert_eq!(announcements[0].visibility, Visibility::GmOnly);
    assert!(announcements[0].succeeded());
}

#[tokio::test]
async fn test_npc_save_below_dc_keeps_effect() {
    setup();
    let harness = TestHarness::new();
    let (actor, token) = harness.add_npc("Goblin", 20);
    let effect = apply(&harness, token, RawEffect::new("fire", "1d6").with_dc(18)).await;

    harness.queue_rolls([2, 17]);
    harness
        .automation
        .process_all_effects(token, TurnEdge::End)
        .await
        .unwrap();

    assert!(harness.host.has_effect(actor, effect));
    assert_eq!(harness.presenter.announcements()[0].flavor(), "DC: 18");
}

#[tokio::test(start_paused = true)]
async fn test_stalled_save_animation_times_out() {
    setup();
    let harness = TestHarness::with_config(
        AutomationConfig::default().with_save_roll_timeout(Duration::from_secs(5)),
    );
    let (actor, token) = harness.add_npc("Goblin", 20);
    let effect = apply(&harness, token, RawEffect::new("acid", "1d6")).await;
    harness.presenter.stall_announcements();

    harness.queue_rolls([1, 20]);
    let report = harness
        .automation
        .process_all_effects(token, TurnEdge::End)
        .await
        .unwrap();

    assert!(report.is_clean());
    assert!(!harness.host.has_effect(actor, effect));
    assert_eq!(harness.presenter.announcements().len(), 1);
}

// =============================================================================
// Deferred player saves
// =============================================================================

#[tokio::test]
async fn test_player_save_is_deferred() {
    setup();
    let harness = TestHarness::new();
    let (actor, token) = harness.add_player("Valeros", 30);
    let effect = apply(&harness, token, RawEffect::new("bleed", "1d6").with_dc(16)).await;

    harness.queue_rolls([5]);
    let report = harness
        .automation
        .process_all_effects(token, TurnEdge::End)
        .await
        .unwrap();

    assert_eq!(report.outcomes[0].save, Some(SaveStatus::Deferred));
    assert!(harness.presenter.announcements().is_empty());
    assert_eq!(harness.presenter.narrations()[0].details, Visibility::All);
    let prompts = harness.presenter.save_prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!((prompts[0].token_id, prompts[0].effect_id), (token, effect));
    assert_eq!(prompts[0].difficulty_class, 16);
    assert_effect_count(&harness, actor, 1);

    // Failed click: the effect stays and the button can be used again.
    harness.queue_rolls([10]);
    let failed = harness.automation.player_save(token, effect).await.unwrap();
    assert_eq!(failed.outcome, SaveOutcome::Failure);
    assert!(harness.host.has_effect(actor, effect));

    harness.queue_rolls([16]);
    let saved = harness.automation.player_save(token, effect).await.unwrap();
    assert_eq!(saved.outcome, SaveOutcome::Success);
    assert!(!harness.host.has_effect(actor, effect));
    assert_eq!(
        harness.presenter.announcements()[1].visibility,
        Visibility::All
    );

    let err = harness.automation.player_save(token, effect).await.unwrap_err();
    assert!(matches!(err, AutomationError::AlreadyResolved(id) if id == effect));
    assert_eq!(
        harness.presenter.warnings(),
        vec!["You already saved on this effect"]
    );
}

#[tokio::test]
async fn test_silent_player_effect_still_offers_save() {
    setup();
    let harness = TestHarness::new();
    let (_, token) = harness.add_player("Kyra", 30);
    apply(&harness, token, RawEffect::new("fire", "1d4").silent()).await;

    harness.queue_rolls([2]);
    harness
        .automation
        .process_all_effects(token, TurnEdge::End)
        .await
        .unwrap();

    assert!(harness.presenter.narrations().is_empty());
    assert_eq!(harness.presenter.save_prompts().len(), 1);
}

// =============================================================================
// Linked actors
// =============================================================================

#[tokio::test]
async fn test_linked_actors_resolve_on_source_turn() {
    setup();
    let harness = TestHarness::new();
    let (summoner, summoner_token) = harness.add_player("Ezren", 30);
    let (eidolon, eidolon_token) = harness.add_npc("Eidolon", 40);
    let second_eidolon = harness.host.add_token(eidolon, "Eidolon 2");
    let (familiar, familiar_token) = harness.add_npc("Familiar", 8);

    harness.confirm.answer(true);
    let outcome = harness
        .automation
        .link_actors(&Selection::controlled([summoner_token]).with_targets([eidolon_token, second_eidolon]))
        .await
        .unwrap();
    assert_eq!(outcome.added, vec![eidolon]);
    assert!(!outcome.rejected_self);
    assert_eq!(harness.host.links(summoner), vec![eidolon]);

    let prompts = harness.confirm.prompts();
    let prompt = &prompts[0];
    assert!(prompt.default_yes);
    assert!(prompt.content.contains("Eidolon"));

    // Links are one level deep: the familiar is linked from the eidolon only.
    harness.confirm.answer(true);
    harness
        .automation
        .link_actors(&Selection::controlled([eidolon_token]).with_targets([familiar_token]))
        .await
        .unwrap();

    apply(&harness, eidolon_token, RawEffect::new("fire", "1d6")).await;
    apply(&harness, familiar_token, RawEffect::new("fire", "1d6")).await;

    harness.queue_rolls([2, 1, 3, 1]);
    let report = harness
        .automation
        .process_all_effects(summoner_token, TurnEdge::End)
        .await
        .unwrap();

    // Both eidolon tokens share one sheet: its record resolves once.
    assert_eq!(report.targets, vec![summoner_token, eidolon_token]);
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(harness.dice.rolled(), vec!["1d6", "1d20"]);
    assert_hp(&harness, eidolon, 38, 0);
    assert_hp(&harness, familiar, 8, 0);
}

#[tokio::test]
async fn test_linking_accumulates_and_rejects_self() {
    setup();
    let harness = TestHarness::new();
    let (source, source_token) = harness.add_npc("Alpha", 10);
    let (beta, beta_token) = harness.add_npc("Beta", 10);
    let (gamma, gamma_token) = harness.add_npc("Gamma", 10);

    harness.confirm.answer(true);
    harness
        .automation
        .link_actors(&Selection::controlled([source_token]).with_targets([beta_token]))
        .await
        .unwrap();

    harness.confirm.answer(true);
    let outcome = harness
        .automation
        .link_actors(
            &Selection::controlled([source_token]).with_targets([source_token, gamma_token, beta_token]),
        )
        .await
        .unwrap();

    assert!(outcome.rejected_self);
    assert_eq!(outcome.added, vec![gamma]);
    assert_eq!(harness.host.links(source), vec![beta, gamma]);
    assert_eq!(
        harness.presenter.warnings(),
        vec!["An actor cannot be linked to itself"]
    );
}

#[tokio::test]
async fn test_declined_link_changes_nothing() {
    setup();
    let harness = TestHarness::new();
    let (source, source_token) = harness.add_npc("Alpha", 10);
    let (_, beta_token) = harness.add_npc("Beta", 10);

    harness.confirm.answer(false);
    let outcome = harness
        .automation
        .link_actors(&Selection::controlled([source_token]).with_targets([beta_token]))
        .await
        .unwrap();

    assert!(outcome.added.is_empty());
    assert!(harness.host.links(source).is_empty());
}

#[tokio::test]
async fn test_link_requires_selection_and_targets() {
    setup();
    let harness = TestHarness::new();
    let (_, token) = harness.add_npc("Alpha", 10);

    let err = harness
        .automation
        .link_actors(&Selection::default().with_targets([token]))
        .await
        .unwrap_err();
    assert!(matches!(err, AutomationError::NoSelection));

    let err = harness
        .automation
        .link_actors(&Selection::controlled([token]))
        .await
        .unwrap_err();
    assert!(matches!(err, AutomationError::NoTarget));

    assert_eq!(
        harness.presenter.warnings(),
        vec!["You must select a token", "You must target the tokens to link"]
    );
    assert!(harness.confirm.prompts().is_empty());
}

#[tokio::test]
async fn test_unlink_clears_links() {
    setup();
    let harness = TestHarness::new();
    let (source, source_token) = harness.add_npc("Alpha", 10);
    let (beta, beta_token) = harness.add_npc("Beta", 10);

    harness.confirm.answer(true);
    harness
        .automation
        .link_actors(&Selection::controlled([source_token]).with_targets([beta_token]))
        .await
        .unwrap();
    assert_eq!(harness.host.links(source), vec![beta]);

    let cleared = harness
        .automation
        .unlink_actors(&Selection::controlled([source_token]))
        .await
        .unwrap();
    assert_eq!(cleared, 1);
    assert!(harness.host.links(source).is_empty());

    apply(&harness, beta_token, RawEffect::new("fire", "1d6")).await;
    let report = harness
        .automation
        .process_all_effects(source_token, TurnEdge::End)
        .await
        .unwrap();
    assert_eq!(report.targets, vec![source_token]);
    assert!(report.outcomes.is_empty());
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_runs_do_not_lose_damage() {
    setup();
    let harness = TestHarness::with_config(AutomationConfig::default().with_batch_processing(false));
    let (actor, token) = harness.add_npc("Ogre", 100);
    apply(&harness, token, RawEffect::new("fire", "1d6").with_dc(30)).await;

    harness.queue_rolls([5, 1, 5, 1, 5, 1, 5, 1]);
    let runs = (0..4).map(|_| {
        let automation = harness.automation.clone();
        tokio::spawn(async move { automation.process_all_effects(token, TurnEdge::End).await })
    });
    for run in runs.collect::<Vec<_>>() {
        let report = run.await.unwrap().unwrap();
        assert_eq!(report.outcomes.len(), 1);
    }

    assert_hp(&harness, actor, 80, 0);
    assert_eq!(harness.records(actor)[0].difficulty_class, 30);
}
