mod common;

use std::sync::atomic::Ordering;

use common::*;
use kestrel_sync::merge::MergeOutcome;
use kestrel_sync::{SkipReason, SyncError, TickOutcome};
use kestrel_types::events::{NoticeLevel, SyncEvent};
use kestrel_types::models::{AccountId, ConversationKey, CredentialGroupId, PendingState};
use tokio::sync::broadcast;

fn drain(events: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

#[tokio::test]
async fn successful_send_keeps_the_entry_at_the_head_as_sent() {
    let net = FakeNetwork::seeded();
    let engine = logged_in(&net).await;
    engine.select_conversation(bob_key()).await.unwrap();
    let mut events = engine.subscribe();

    let entry = engine.send("hello bob").await.unwrap();

    let pending = entry.pending.unwrap();
    assert_eq!(pending.state, PendingState::Sent);
    assert!(entry.is_sender);
    assert!(entry.timestamp_nanos > 500);

    let conversation = engine.conversation(&bob_key()).await.unwrap();
    assert_eq!(conversation.messages.len(), 3);
    assert_eq!(conversation.messages[0], entry);
    assert!(!engine.session().is_refresh_locked());

    let sent = net.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].ciphertext, "hello bob");
    assert_eq!(sent[0].credential, CredentialGroupId::new(BOB, DEFAULT_GROUP));

    assert!(drain(&mut events).contains(&SyncEvent::SendCommitted {
        key: bob_key(),
        local_id: pending.local_id,
    }));
}

#[tokio::test]
async fn failed_send_rolls_back_and_reports() {
    let net = FakeNetwork::seeded();
    let engine = logged_in(&net).await;
    engine.select_conversation(bob_key()).await.unwrap();
    let mut events = engine.subscribe();

    net.fail_send.store(true, Ordering::SeqCst);
    let err = engine.send("lost").await.unwrap_err();

    assert!(matches!(err, SyncError::SendFailure(_)));
    assert_eq!(stamps(&engine, &bob_key()).await, vec![500, 300]);
    assert!(!engine.session().is_refresh_locked());

    let seen = drain(&mut events);
    assert!(seen
        .iter()
        .any(|e| matches!(e, SyncEvent::SendRolledBack { key, .. } if *key == bob_key())));
    assert!(seen.iter().any(|e| matches!(
        e,
        SyncEvent::Notice {
            level: NoticeLevel::Error,
            ..
        }
    )));
}

#[tokio::test]
async fn in_flight_send_blocks_ticks_and_second_sends() {
    let net = FakeNetwork::seeded();
    let engine = logged_in(&net).await;
    engine.select_conversation(bob_key()).await.unwrap();

    net.send_gate.hold();
    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.send("first").await })
    };
    net.send_gate.entered().await;

    let head = engine.conversation(&bob_key()).await.unwrap().messages[0].clone();
    assert_eq!(head.body, "first");
    assert_eq!(head.pending.unwrap().state, PendingState::InFlight);

    let second = engine.send("second").await.unwrap_err();
    assert!(matches!(second, SyncError::SendInFlight(key) if key == bob_key()));

    let calls = net.calls.total();
    assert_eq!(engine.tick().await, TickOutcome::Skipped(SkipReason::Locked));
    assert_eq!(net.calls.total(), calls);

    net.send_gate.release();
    first.await.unwrap().unwrap();
    assert_eq!(net.sent().len(), 1);
}

#[tokio::test]
async fn confirmed_copy_supersedes_the_provisional_entry() {
    let net = FakeNetwork::seeded();
    let engine = logged_in(&net).await;
    engine.select_conversation(bob_key()).await.unwrap();
    engine.send("see you").await.unwrap();

    let outcome = engine.tick().await;
    assert_eq!(
        outcome,
        TickOutcome::Merged {
            key: bob_key(),
            outcome: MergeOutcome::Merged {
                added: 1,
                superseded: 1
            },
        }
    );

    let conversation = engine.conversation(&bob_key()).await.unwrap();
    assert_eq!(conversation.messages.len(), 3);
    assert_eq!(conversation.messages[0].body, "see you");
    assert!(conversation.messages.iter().all(|m| !m.is_pending()));
}

#[tokio::test]
async fn offline_send_is_refused_without_network_calls() {
    let net = FakeNetwork::seeded();
    let engine = logged_in(&net).await;
    engine.select_conversation(bob_key()).await.unwrap();
    engine.set_online(false);

    let calls = net.calls.total();
    let err = engine.send("nope").await.unwrap_err();

    assert!(matches!(err, SyncError::NetworkUnavailable));
    assert_eq!(net.calls.total(), calls);
    assert_eq!(stamps(&engine, &bob_key()).await, vec![500, 300]);
}

#[tokio::test]
async fn send_needs_a_selected_conversation() {
    let net = FakeNetwork::seeded();
    let engine = logged_in(&net).await;
    assert!(matches!(
        engine.send("to nobody").await,
        Err(SyncError::NoConversationSelected)
    ));
}

#[tokio::test]
async fn unknown_recipient_credential_is_refreshed_once_before_sealing() {
    let net = FakeNetwork::seeded();
    let engine = logged_in(&net).await;
    let (dave, _) = engine
        .start_conversation(AccountId::new("dave"))
        .await
        .unwrap();
    assert_eq!(dave, ConversationKey::direct(&AccountId::new("dave")));

    net.grant(ME, CredentialGroupId::new("dave", DEFAULT_GROUP));
    let lists = net.calls.list.load(Ordering::SeqCst);
    engine.send("hi dave").await.unwrap();

    assert_eq!(net.calls.list.load(Ordering::SeqCst), lists + 1);
    assert_eq!(net.sent().len(), 1);
}

#[tokio::test]
async fn send_into_an_empty_conversation_is_never_merged_away() {
    let net = FakeNetwork::seeded();
    let engine = logged_in(&net).await;
    engine.start_conversation(AccountId::new(CAROL)).await.unwrap();
    engine.send("first words").await.unwrap();

    let outcome = engine.tick().await;
    assert!(matches!(
        outcome,
        TickOutcome::Merged {
            outcome: MergeOutcome::NoAnchor,
            ..
        }
    ));
    let conversation = engine.conversation(&carol_key()).await.unwrap();
    assert_eq!(conversation.messages.len(), 1);
    assert!(conversation.messages[0].is_pending());
}

#[tokio::test]
async fn send_answered_after_logout_publishes_nothing() {
    let net = FakeNetwork::seeded();
    let engine = logged_in(&net).await;
    engine.select_conversation(bob_key()).await.unwrap();
    let mut events = engine.subscribe();

    net.send_gate.hold();
    let sending = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.send("bye").await })
    };
    net.send_gate.entered().await;
    engine.logout().await;
    net.send_gate.release();

    let entry = sending.await.unwrap().unwrap();
    assert_eq!(entry.pending.unwrap().state, PendingState::Sent);
    assert!(engine.conversations().await.is_empty());
    assert!(!engine.session().is_refresh_locked());
    assert!(!drain(&mut events)
        .iter()
        .any(|e| matches!(e, SyncEvent::SendCommitted { .. })));
}

#[tokio::test]
async fn send_failing_after_logout_publishes_nothing() {
    let net = FakeNetwork::seeded();
    let engine = logged_in(&net).await;
    engine.select_conversation(bob_key()).await.unwrap();
    let mut events = engine.subscribe();

    net.fail_send.store(true, Ordering::SeqCst);
    net.send_gate.hold();
    let sending = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.send("bye").await })
    };
    net.send_gate.entered().await;
    engine.logout().await;
    net.send_gate.release();

    assert!(matches!(
        sending.await.unwrap(),
        Err(SyncError::SendFailure(_))
    ));
    assert!(drain(&mut events).iter().all(|e| matches!(
        e,
        SyncEvent::SessionChanged { account: None }
    )));
}
