// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue processor integration tests.
//!
//! Each test builds an isolated TestHarness with a temp SQLite database and
//! a scripted mock provider.

use std::time::Duration;

use indica_core::event::INDICATOR_JOINED;
use indica_core::{
    EntryMetadata, FlowRepository, MessageContent, NewQueueEntry, Participant, Priority,
    QueueStatus, QueueStore, TriggerData,
};
use indica_dispatch::{TickOutcome, TickReport, drain_processor, run_dispatch_loop};
use indica_test_utils::{MockTextProvider, TEST_TENANT, TestHarness};
use tokio_util::sync::CancellationToken;

fn ana() -> Participant {
    Participant {
        id: Some("p1".into()),
        name: "Ana".into(),
        phone: Some("11999990000".into()),
        ..Default::default()
    }
}

fn report(outcome: TickOutcome) -> TickReport {
    match outcome {
        TickOutcome::Ran(report) => report,
        TickOutcome::Skipped => panic!("tick was skipped"),
    }
}

async fn one_step_flow(harness: &TestHarness) -> String {
    let tpl = harness.approved_template("Olá {name}!").await.unwrap();
    harness
        .active_flow(INDICATOR_JOINED, &[(tpl.as_str(), 0)])
        .await
        .unwrap()
}

// ---- Test 1: Happy path ----

#[tokio::test]
async fn test_successful_send_completes_entry_and_counts_flow() {
    let provider = MockTextProvider::new();
    provider.push_success("SM123").await;
    let harness = TestHarness::builder()
        .with_provider(provider)
        .build()
        .await
        .unwrap();
    let flow_id = one_step_flow(&harness).await;
    harness.engine.indicator_joined(TEST_TENANT, ana(), None).await;

    let report = report(harness.processor.tick().await);
    assert_eq!(report.processed, 1);
    assert_eq!(report.completed, 1);

    let entry = &harness.entries().await.unwrap()[0];
    assert_eq!(entry.status, QueueStatus::Completed);
    assert_eq!(entry.provider_message_id.as_deref(), Some("SM123"));
    assert!(entry.processed_at.is_some());

    let sent = harness.provider.sent().await;
    assert_eq!(sent[0].to, "+5511999990000");
    assert!(sent[0].body.starts_with("Olá Ana!"));

    let flow = harness.storage.get_flow(&flow_id).await.unwrap().unwrap();
    assert_eq!(flow.statistics.sent, 1);
    assert_eq!(flow.statistics.failed, 0);
}

// ---- Test 2: Retry budget ----

#[tokio::test]
async fn test_failures_retry_until_budget_is_spent() {
    let provider = MockTextProvider::new();
    provider.push_failures(3, "carrier unavailable").await;
    let harness = TestHarness::builder()
        .with_provider(provider)
        .with_max_retries(3)
        .build()
        .await
        .unwrap();
    let flow_id = one_step_flow(&harness).await;
    harness.engine.indicator_joined(TEST_TENANT, ana(), None).await;

    assert_eq!(report(harness.processor.tick().await).retried, 1);
    let entry = harness.entries().await.unwrap().remove(0);
    assert_eq!(entry.status, QueueStatus::Retry);
    assert_eq!(entry.retry_count, 1);
    assert!(entry.next_retry_at.is_some());
    assert!(
        entry
            .error_message
            .as_deref()
            .is_some_and(|e| e.contains("carrier unavailable"))
    );

    assert_eq!(report(harness.processor.tick().await).retried, 1);
    assert_eq!(report(harness.processor.tick().await).failed, 1);

    let entry = harness.entry(&entry.id).await.unwrap();
    assert_eq!(entry.status, QueueStatus::Failed);
    assert_eq!(entry.retry_count, 2);
    assert!(entry.next_retry_at.is_none());
    assert_eq!(harness.provider.sent_count().await, 3);

    let flow = harness.storage.get_flow(&flow_id).await.unwrap().unwrap();
    assert_eq!(flow.statistics.failed, 1);
    assert_eq!(flow.statistics.sent, 0);

    // Nothing left to do.
    assert_eq!(report(harness.processor.tick().await).processed, 0);
}

// ---- Test 3: Sequential fallback ----

#[tokio::test]
async fn test_permanent_failure_releases_next_step() {
    let provider = MockTextProvider::new();
    provider.push_failure("unreachable handset").await;
    let harness = TestHarness::builder()
        .with_provider(provider)
        .with_max_retries(1)
        .build()
        .await
        .unwrap();
    let first = harness.approved_template("Passo 1").await.unwrap();
    let second = harness.approved_template("Passo 2").await.unwrap();
    harness
        .active_flow(INDICATOR_JOINED, &[(first.as_str(), 0), (second.as_str(), 0)])
        .await
        .unwrap();
    harness.engine.indicator_joined(TEST_TENANT, ana(), None).await;

    // Step 2 waits behind step 1.
    let report1 = report(harness.processor.tick().await);
    assert_eq!(report1.processed, 1);
    assert_eq!(report1.failed, 1);
    assert_eq!(report1.advanced, 1);

    let entries = harness.entries().await.unwrap();
    assert_eq!(entries[0].status, QueueStatus::Failed);
    assert_eq!(entries[1].status, QueueStatus::Pending);

    let report2 = report(harness.processor.tick().await);
    assert_eq!(report2.completed, 1);
    let sent = harness.provider.sent().await;
    assert_eq!(sent.len(), 2);
    assert!(sent[1].body.starts_with("Passo 2"));
}

#[tokio::test]
async fn test_steps_are_sent_in_order_one_per_tick() {
    let harness = TestHarness::new().await.unwrap();
    let first = harness.approved_template("Primeiro").await.unwrap();
    let second = harness.approved_template("Segundo").await.unwrap();
    harness
        .active_flow(INDICATOR_JOINED, &[(first.as_str(), 0), (second.as_str(), 0)])
        .await
        .unwrap();
    harness.engine.indicator_joined(TEST_TENANT, ana(), None).await;

    assert_eq!(report(harness.processor.tick().await).completed, 1);
    assert_eq!(report(harness.processor.tick().await).completed, 1);

    let bodies: Vec<String> = harness
        .provider
        .sent()
        .await
        .into_iter()
        .map(|s| s.body)
        .collect();
    assert!(bodies[0].starts_with("Primeiro"));
    assert!(bodies[1].starts_with("Segundo"));
}

// ---- Test 4: Scheduling ----

#[tokio::test]
async fn test_delayed_step_is_not_dispatched_early() {
    let harness = TestHarness::new().await.unwrap();
    let tpl = harness.approved_template("Depois").await.unwrap();
    harness
        .active_flow(INDICATOR_JOINED, &[(tpl.as_str(), 3600)])
        .await
        .unwrap();
    harness.engine.indicator_joined(TEST_TENANT, ana(), None).await;

    assert_eq!(report(harness.processor.tick().await).processed, 0);
    assert_eq!(harness.provider.sent_count().await, 0);
}

#[tokio::test]
async fn test_higher_priority_entries_go_first() {
    let harness = TestHarness::new().await.unwrap();
    for (to, priority) in [
        ("+5511999990003", Priority::Low),
        ("+5511999990001", Priority::High),
        ("+5511999990002", Priority::Medium),
    ] {
        harness
            .storage
            .enqueue(NewQueueEntry {
                tenant_id: TEST_TENANT.into(),
                flow_id: None,
                template_id: None,
                to: to.into(),
                from: String::new(),
                content: MessageContent {
                    body: format!("para {to}"),
                    ..Default::default()
                },
                variables: Default::default(),
                priority,
                trigger: "manual".into(),
                trigger_data: TriggerData::default(),
                max_retries: 1,
                metadata: EntryMetadata::default(),
            })
            .await
            .unwrap();
    }

    assert_eq!(report(harness.processor.tick().await).completed, 3);
    let order: Vec<String> = harness
        .provider
        .sent()
        .await
        .into_iter()
        .map(|s| s.to)
        .collect();
    assert_eq!(
        order,
        vec!["+5511999990001", "+5511999990002", "+5511999990003"]
    );
}

#[tokio::test]
async fn test_process_now_respects_limit() {
    let harness = TestHarness::new().await.unwrap();
    let tpl = harness.approved_template("Oi").await.unwrap();
    harness
        .active_flow(INDICATOR_JOINED, &[(tpl.as_str(), 0)])
        .await
        .unwrap();
    for phone in ["11999990001", "11999990002", "11999990003"] {
        let participant = Participant {
            phone: Some(phone.into()),
            ..ana()
        };
        harness
            .engine
            .indicator_joined(TEST_TENANT, participant, None)
            .await;
    }

    assert_eq!(report(harness.processor.process_now(2).await).processed, 2);
    assert_eq!(report(harness.processor.process_now(2).await).processed, 1);
}

// ---- Test 5: Provider timeout ----

#[tokio::test]
async fn test_provider_timeout_counts_as_failure() {
    let harness = TestHarness::builder()
        .with_provider(MockTextProvider::new().with_delay(Duration::from_secs(2)))
        .with_provider_timeout(Duration::from_millis(50))
        .with_max_retries(1)
        .build()
        .await
        .unwrap();
    one_step_flow(&harness).await;
    harness.engine.indicator_joined(TEST_TENANT, ana(), None).await;

    assert_eq!(report(harness.processor.tick().await).failed, 1);
    let entry = harness.entries().await.unwrap().remove(0);
    assert_eq!(entry.status, QueueStatus::Failed);
    assert!(
        entry
            .error_message
            .as_deref()
            .is_some_and(|e| e.contains("timed out"))
    );
}

// ---- Test 6: Re-entrancy guard ----

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_overlapping_tick_is_skipped() {
    let harness = TestHarness::builder()
        .with_provider(MockTextProvider::new().with_delay(Duration::from_millis(300)))
        .build()
        .await
        .unwrap();
    one_step_flow(&harness).await;
    harness.engine.indicator_joined(TEST_TENANT, ana(), None).await;

    let processor = harness.processor.clone();
    let (first, second) = tokio::join!(processor.tick(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        harness.processor.tick().await
    });

    assert_eq!(second, TickOutcome::Skipped);
    assert_eq!(report(first).completed, 1);
    assert_eq!(harness.provider.sent_count().await, 1);
    assert!(!harness.processor.is_running());
}

// ---- Test 7: Background loop and shutdown ----

#[tokio::test]
async fn test_dispatch_loop_drains_and_stops_on_cancel() {
    let harness = TestHarness::new().await.unwrap();
    one_step_flow(&harness).await;
    harness.engine.indicator_joined(TEST_TENANT, ana(), None).await;

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run_dispatch_loop(
        harness.processor.clone(),
        Duration::from_millis(20),
        cancel.clone(),
    ));

    for _ in 0..100 {
        if harness.provider.sent_count().await > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cancel.cancel();
    handle.await.unwrap();

    assert!(drain_processor(&harness.processor, Duration::from_secs(1)).await);
    let entry = harness.entries().await.unwrap().remove(0);
    assert_eq!(entry.status, QueueStatus::Completed);
}

// ---- Test 8: Maintenance ----

#[tokio::test]
async fn test_maintenance_keeps_recent_entries() {
    let harness = TestHarness::new().await.unwrap();
    one_step_flow(&harness).await;
    harness.engine.indicator_joined(TEST_TENANT, ana(), None).await;
    harness.drain(5).await;

    let report = harness.processor.maintain().await.unwrap();
    assert_eq!(report.reclaimed, 0);
    assert_eq!(report.purged, 0);
    assert_eq!(harness.entries().await.unwrap().len(), 1);

    // A zero-day window purges everything already finished.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(harness.processor.purge(0).await.unwrap(), 1);
    assert!(harness.entries().await.unwrap().is_empty());
}
