mod common;

use common::{abc_store, ids};
use notegraf_core::model::note::NoteId;
use notegraf_core::service::sequence::SequenceAssembler;
use notegraf_core::service::{BrowseConfig, ErrorKind, LoadStatus, RunOutcome, PENDING_TEXT};
use notegraf_core::store::StoreError;
use std::sync::Arc;
use std::time::Duration;

fn session(store: common::ScriptedStore, anchor: &str) -> SequenceAssembler<common::ScriptedStore> {
    SequenceAssembler::new(Arc::new(store), NoteId::from(anchor), &BrowseConfig::default())
}

#[tokio::test]
async fn mount_is_non_recursive_by_default_and_shows_pending_first() {
    let assembler = session(abc_store(), "B");

    let run = assembler.mount();
    let pending = assembler.state();
    assert!(pending.status.is_loading());
    assert_eq!(pending.status.describe(), PENDING_TEXT);
    assert!(pending.notes.is_empty());

    assert_eq!(run.await, RunOutcome::Committed);
    let state = assembler.state();
    assert!(state.status.is_loaded());
    assert!(!state.recursive);
    assert_eq!(ids(&state.notes), vec!["B"]);
}

#[tokio::test]
async fn recursive_default_comes_from_config() {
    let config = BrowseConfig {
        recursive_default: true,
    };
    let assembler = SequenceAssembler::new(Arc::new(abc_store()), NoteId::from("B"), &config);

    assembler.mount().await;

    assert_eq!(ids(&assembler.state().notes), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn toggling_recursion_reassembles_from_scratch() {
    let store = Arc::new(abc_store());
    let assembler =
        SequenceAssembler::new(Arc::clone(&store), NoteId::from("B"), &BrowseConfig::default());

    assembler.mount().await;
    assembler.toggle_recursive().await;
    assert_eq!(ids(&assembler.state().notes), vec!["A", "B", "C"]);

    assembler.toggle_recursive().await;
    assert_eq!(ids(&assembler.state().notes), vec!["B"]);
    assert_eq!(store.fetched_notes(), vec!["B", "B", "A", "C", "B"]);
}

#[tokio::test(start_paused = true)]
async fn slow_superseded_run_never_overwrites_newer_result() {
    let store = abc_store().delayed("A", Duration::from_millis(500));
    let assembler = session(store, "B");

    let slow = assembler.set_recursive(true);
    let fast = assembler.set_recursive(false);
    let (slow, fast) = tokio::join!(slow, fast);

    assert_eq!(slow, RunOutcome::Superseded);
    assert_eq!(fast, RunOutcome::Committed);
    let state = assembler.state();
    assert!(!state.recursive);
    assert_eq!(ids(&state.notes), vec!["B"]);
}

#[tokio::test(start_paused = true)]
async fn older_run_finishing_first_is_discarded() {
    let store = abc_store().delayed("A", Duration::from_millis(500));
    let assembler = session(store, "B");

    let older = assembler.set_recursive(false);
    let newer = assembler.set_recursive(true);
    let mut rx = assembler.subscribe();
    rx.borrow_and_update();

    let (older, newer) = tokio::join!(older, newer);

    assert_eq!(older, RunOutcome::Superseded);
    assert_eq!(newer, RunOutcome::Committed);
    assert_eq!(ids(&assembler.state().notes), vec!["A", "B", "C"]);
    // Only the committed run produced a visible change.
    assert!(rx.has_changed().unwrap());
    assert_eq!(ids(&rx.borrow_and_update().notes), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn failed_run_clears_chain_and_next_run_recovers() {
    let store = abc_store().failing("A", StoreError::Transport("timed out".to_string()));
    let assembler = session(store, "B");

    assembler.set_recursive(true).await;
    let state = assembler.state();
    assert_eq!(state.status.error().map(|err| err.kind()), Some(ErrorKind::Transport));
    assert!(state.notes.is_empty());
    assert!(state.status.describe().contains("timed out"));

    assembler.set_recursive(false).await;
    let state = assembler.state();
    assert_eq!(state.status, LoadStatus::Loaded);
    assert_eq!(ids(&state.notes), vec!["B"]);
}

#[tokio::test]
async fn changing_anchor_resets_session() {
    let assembler = session(abc_store(), "B");
    assembler.mount().await;

    let run = assembler.set_anchor(NoteId::from("C"));
    let pending = assembler.state();
    assert_eq!(pending.anchor, NoteId::from("C"));
    assert!(pending.notes.is_empty());

    run.await;
    assert_eq!(ids(&assembler.state().notes), vec!["C"]);
}

#[tokio::test]
async fn subscribers_observe_commits() {
    let assembler = session(abc_store(), "B");
    let mut rx = assembler.subscribe();

    assembler.mount().await;

    assert!(rx.has_changed().unwrap());
    let seen = rx.borrow_and_update().clone();
    assert!(seen.status.is_loaded());
    assert_eq!(seen.generation, 1);
}
