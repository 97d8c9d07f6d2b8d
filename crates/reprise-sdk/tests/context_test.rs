// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Handler-level tests driven through the scripted test driver.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use common::*;
use proptest::prelude::*;
use reprise_sdk::{
    CloseReason, Context, Entry, InboundMessage, InvocationRef, OutboundMessage, RetryPolicy,
    RunError, RunProposal, StartInfo, Target, TerminalError, TestDriver, VmOptions,
};

fn reverse_await_order(order: [u32; 2]) -> reprise_sdk::TestOutcome {
    let mut script = vec![start(1), input("Till")];
    for index in order {
        let value = if index == 1 { "FRANCESCO" } else { "TILL" };
        script.push(completion(index, value));
    }
    TestDriver::new(greet).run(script)
}

#[test]
fn test_reverse_await_order() {
    let in_order = reverse_await_order([1, 2]);
    let reversed = reverse_await_order([2, 1]);

    assert_eq!(in_order.output, reversed.output);
    assert_eq!(in_order.close_reason, Some(CloseReason::Output));
    assert_eq!(
        in_order.output_value::<String>().unwrap(),
        "Hello FRANCESCO-TILL"
    );
    assert_eq!(
        in_order.entries(),
        vec![
            &call_entry("Francesco", None),
            &call_entry("Till", None),
            &Entry::SetState {
                key: "A2".into(),
                value: json("TILL"),
            },
            &Entry::Output {
                result: Ok(json("Hello FRANCESCO-TILL")),
            },
        ]
    );
}

#[test]
fn test_failed_first_call_fails_the_invocation() {
    let outcome = TestDriver::new(greet).run([
        start(1),
        input("Till"),
        completion(2, "TILL"),
        failed(1, 404, "Francesco is unknown"),
    ]);

    let err = outcome.output_value::<String>().unwrap_err();
    assert_eq!(err, TerminalError::with_code(404, "Francesco is unknown"));
    // The second response was stored before the first call failed.
    assert!(outcome.entries().contains(&&Entry::SetState {
        key: "A2".into(),
        value: json("TILL"),
    }));
}

#[test]
fn test_suspends_when_input_closes_while_waiting() {
    let outcome = TestDriver::new(greet).run([start(1), input("Till"), completion(2, "TILL")]);

    assert_eq!(outcome.close_reason, Some(CloseReason::Suspended));
    assert_eq!(outcome.suspension(), Some(&[1u32][..]));
    assert_eq!(outcome.entries().len(), 3);
}

#[test]
fn test_replay_resumes_without_repeating_entries() {
    let outcome = TestDriver::new(greet).run([
        start(4),
        input("Till"),
        InboundMessage::Entry(call_entry("Francesco", Some("FRANCESCO"))),
        InboundMessage::Entry(call_entry("Till", Some("TILL"))),
        InboundMessage::Entry(Entry::SetState {
            key: "A2".into(),
            value: json("TILL"),
        }),
    ]);

    assert_eq!(
        outcome.output,
        vec![OutboundMessage::Entry {
            index: 4,
            entry: Entry::Output {
                result: Ok(json("Hello FRANCESCO-TILL")),
            },
        }]
    );
}

#[test]
fn test_replay_mismatch_closes_with_error() {
    let outcome = TestDriver::new(greet).run([
        start(2),
        input("Till"),
        InboundMessage::Entry(Entry::Call {
            target: Target::new("Lower", "lower"),
            parameter: json("Francesco"),
            result: None,
        }),
    ]);

    let (code, message) = outcome.error().unwrap();
    assert_eq!(code, 570);
    assert!(message.contains("Lower/lower"), "{}", message);
    assert!(matches!(outcome.close_reason, Some(CloseReason::Failed(_))));
    assert!(outcome.entries().is_empty());
}

#[test]
fn test_completion_for_unknown_entry_is_a_protocol_violation() {
    let outcome = TestDriver::new(greet).run([start(1), input("Till"), completion(7, "?")]);

    assert_eq!(outcome.error().map(|(code, _)| code), Some(571));
    assert_eq!(outcome.errors.len(), 1);
    assert!(matches!(outcome.close_reason, Some(CloseReason::Failed(_))));
}

async fn roll(ctx: Context, executions: Arc<AtomicU32>) -> Result<u32, TerminalError> {
    ctx.run("roll", move || async move {
        executions.fetch_add(1, Ordering::SeqCst);
        Ok::<_, RunError>(4u32)
    })
    .await
}

#[test]
fn test_run_executes_once_and_is_acknowledged() {
    let executions = Arc::new(AtomicU32::new(0));
    let counter = executions.clone();
    let outcome = TestDriver::new(move |ctx| roll(ctx, counter))
        .with_auto_ack()
        .run([start(1), input("Till")]);

    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.output_value::<u32>().unwrap(), 4);
    assert_eq!(
        outcome.run_proposals(),
        vec![(1, &RunProposal::Success(Bytes::from_static(b"4")))]
    );
}

#[test]
fn test_replayed_run_is_not_executed() {
    let executions = Arc::new(AtomicU32::new(0));
    let counter = executions.clone();
    let outcome = TestDriver::new(move |ctx| roll(ctx, counter)).run([
        start(2),
        input("Till"),
        InboundMessage::Entry(Entry::Run {
            name: "roll".into(),
            result: Some(reprise_sdk::Completion::Success(json(&4u32))),
        }),
    ]);

    assert_eq!(executions.load(Ordering::SeqCst), 0);
    assert_eq!(outcome.output_value::<u32>().unwrap(), 4);
    assert!(outcome.run_proposals().is_empty());
}

async fn flaky(ctx: Context, executions: Arc<AtomicU32>) -> Result<u32, TerminalError> {
    ctx.run("flaky", move || async move {
        executions.fetch_add(1, Ordering::SeqCst);
        Err::<u32, _>(RunError::transient(anyhow::anyhow!("upstream unavailable")))
    })
    .await
}

#[test]
fn test_transient_run_failure_closes_for_retry() {
    let executions = Arc::new(AtomicU32::new(0));
    let counter = executions.clone();
    let outcome = TestDriver::new(move |ctx| flaky(ctx, counter))
        .with_auto_ack()
        .run([start(1), input("Till")]);

    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.close_reason, Some(CloseReason::RetryLater));
    assert!(outcome.output_value::<u32>().is_err());

    let proposals = outcome.run_proposals();
    assert_eq!(proposals.len(), 1);
    match proposals[0].1 {
        RunProposal::Transient(transient) => {
            assert_eq!(transient.attempt, 1);
            assert_eq!(transient.next_retry_delay, Duration::from_millis(50));
            assert!(transient.failure.message.contains("upstream unavailable"));
        }
        other => panic!("expected a transient proposal, got {:?}", other),
    }
}

#[test]
fn test_exhausted_retries_fail_the_run_permanently() {
    let executions = Arc::new(AtomicU32::new(0));
    let counter = executions.clone();
    let policy = RetryPolicy::exponential(Duration::from_millis(10)).with_max_attempts(3);
    let options = VmOptions::default().with_retry_policy(policy);
    let start = InboundMessage::Start(StartInfo {
        invocation_id: Bytes::from_static(INVOCATION_ID),
        debug_id: "inv-0001".into(),
        known_entries: 2,
        retry_count: 2,
        ..Default::default()
    });

    let outcome = TestDriver::with_options(options, move |ctx| flaky(ctx, counter))
        .with_auto_ack()
        .run([
            start,
            input("Till"),
            InboundMessage::Entry(Entry::Run {
                name: "flaky".into(),
                result: None,
            }),
        ]);

    assert_eq!(executions.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.close_reason, Some(CloseReason::Output));
    let err = outcome.output_value::<u32>().unwrap_err();
    assert!(err.message().contains("upstream unavailable"));
}

#[test]
fn test_terminal_run_failure_is_journaled() {
    let outcome = TestDriver::new(|ctx: Context| async move {
        ctx.run("validate", || async {
            Err::<(), _>(RunError::terminal(400, "invalid order"))
        })
        .await
    })
    .with_auto_ack()
    .run([start(1), input("Till")]);

    assert!(matches!(
        outcome.run_proposals()[..],
        [(1, RunProposal::Failure(_))]
    ));
    assert_eq!(
        outcome.output_value::<()>().unwrap_err(),
        TerminalError::with_code(400, "invalid order")
    );
}

#[test]
fn test_state_reads_see_eager_state_and_own_writes() {
    let start = InboundMessage::Start(StartInfo {
        invocation_id: Bytes::from_static(INVOCATION_ID),
        debug_id: "inv-0001".into(),
        known_entries: 1,
        state_map: vec![("A".into(), json("x"))],
        partial_state: false,
        retry_count: 0,
    });

    let outcome = TestDriver::new(|ctx: Context| async move {
        let a: Option<String> = ctx.get_state("A").await?;
        let missing: Option<String> = ctx.get_state("missing").await?;
        ctx.set_state("B", "y")?;
        let b: Option<String> = ctx.get_state("B").await?;
        ctx.clear_state("A");
        let cleared: Option<String> = ctx.get_state("A").await?;
        Ok::<_, TerminalError>((a, missing, b, cleared))
    })
    .run([start, input("Till")]);

    let value: (Option<String>, Option<String>, Option<String>, Option<String>) =
        outcome.output_value().unwrap();
    assert_eq!(value, (Some("x".into()), None, Some("y".into()), None));
    assert!(outcome.suspension().is_none());
}

#[test]
fn test_partial_state_asks_the_runtime() {
    let start = InboundMessage::Start(StartInfo {
        invocation_id: Bytes::from_static(INVOCATION_ID),
        debug_id: "inv-0001".into(),
        known_entries: 1,
        partial_state: true,
        ..Default::default()
    });

    let outcome = TestDriver::new(|ctx: Context| async move {
        let value: Option<u32> = ctx.get_state("counter").await?;
        Ok::<_, TerminalError>(value.unwrap_or(0) + 1)
    })
    .run([start, input("Till"), completion(1, &41u32)]);

    assert_eq!(outcome.output_value::<u32>().unwrap(), 42);
}

#[test]
fn test_late_state_result_does_not_hide_own_write() {
    let start = InboundMessage::Start(StartInfo {
        invocation_id: Bytes::from_static(INVOCATION_ID),
        debug_id: "inv-0001".into(),
        known_entries: 1,
        partial_state: true,
        ..Default::default()
    });

    let outcome = TestDriver::new(|ctx: Context| async move {
        let before = ctx.get_state::<String>("k");
        ctx.set_state("k", "new")?;
        let before = before.await?;
        let after: Option<String> = ctx.get_state("k").await?;
        Ok::<_, TerminalError>((before, after))
    })
    .run([start, input("Till"), completion(1, "old")]);

    let value: (Option<String>, Option<String>) = outcome.output_value().unwrap();
    assert_eq!(value, (Some("old".into()), Some("new".into())));
}

#[test]
fn test_dropped_future_does_not_block_suspension() {
    let outcome = TestDriver::new(|ctx: Context| async move {
        drop(ctx.get_state::<String>("k"));
        ctx.sleep(Duration::from_secs(1)).await?;
        Ok::<_, TerminalError>(())
    })
    .run([start(1), input("Till")]);

    assert_eq!(outcome.close_reason, Some(CloseReason::Suspended));
    assert_eq!(outcome.suspension(), Some(&[2u32][..]));
}

#[test]
fn test_awakeable_completed_externally() {
    let outcome = TestDriver::new(|ctx: Context| async move {
        let (id, approval) = ctx.awakeable::<String>();
        ctx.send(Target::new("Notifier", "notify"), &id, None)?;
        approval.await
    })
    .run([start(1), input("Till"), completion(1, "approved")]);

    assert_eq!(outcome.output_value::<String>().unwrap(), "approved");
    match outcome.entries()[1] {
        Entry::Send {
            parameter,
            invoke_time: None,
            ..
        } => {
            let id: String = serde_json::from_slice(parameter).unwrap();
            assert!(id.starts_with("prom_1"));
        }
        other => panic!("expected a send, got {:?}", other),
    }
}

#[test]
fn test_awakeable_can_only_be_completed_once() {
    let outcome = TestDriver::new(|ctx: Context| async move {
        let (id, _awakeable) = ctx.awakeable::<u32>();
        ctx.resolve_awakeable(&id, &1u32)?;
        let second = ctx.reject_awakeable(&id, TerminalError::new("too late"));
        Ok::<_, TerminalError>(second.is_err())
    })
    .run([start(1), input("Till")]);

    assert!(outcome.output_value::<bool>().unwrap());
}

#[test]
fn test_promises_and_sleep() {
    let outcome = TestDriver::new(|ctx: Context| async move {
        let peeked: Option<String> = ctx.peek_promise("decision").await?;
        ctx.sleep(Duration::from_secs(5)).await?;
        let decision: String = ctx.promise("decision").await?;
        ctx.resolve_promise("audit", &decision)?;
        Ok::<_, TerminalError>((peeked, decision))
    })
    .run([
        start(1),
        input("Till"),
        InboundMessage::Completion {
            index: 1,
            completion: reprise_sdk::Completion::Empty,
        },
        InboundMessage::Completion {
            index: 2,
            completion: reprise_sdk::Completion::Empty,
        },
        completion(3, "accepted"),
    ]);

    let value: (Option<String>, String) = outcome.output_value().unwrap();
    assert_eq!(value, (None, "accepted".to_string()));
    assert!(matches!(outcome.entries()[1], Entry::Sleep { .. }));
    assert!(matches!(
        outcome.entries()[3],
        Entry::CompletePromise { key, .. } if key == "audit"
    ));
}

#[test]
fn test_cancelled_call() {
    let outcome = TestDriver::new(|ctx: Context| async move {
        let invalid = ctx.cancel(InvocationRef::Call(0)).is_err();
        let call = ctx.call::<_, String>(upper(), "Till");
        let index = call.index().unwrap();
        ctx.cancel(InvocationRef::Call(index))?;
        match call.await {
            Err(err) if err.is_cancelled() => Ok(invalid),
            other => Err(TerminalError::new(format!("unexpected {:?}", other))),
        }
    })
    .run([start(1), input("Till"), failed(1, 409, "cancelled")]);

    assert!(outcome.output_value::<bool>().unwrap());
    assert_eq!(
        outcome.entries()[1],
        &Entry::CancelInvocation {
            target: InvocationRef::Call(1),
        }
    );
}

#[test]
fn test_delayed_send() {
    let outcome = TestDriver::new(|ctx: Context| async move {
        ctx.send(upper(), "later", Some(Duration::from_secs(60)))?;
        Ok::<_, TerminalError>(())
    })
    .run([start(1), input("Till")]);

    assert_eq!(outcome.close_reason, Some(CloseReason::Output));
    assert!(matches!(
        outcome.entries()[0],
        Entry::Send {
            invoke_time: Some(_),
            ..
        }
    ));
}

/// Issues `n` calls, awaits them in reverse order and joins the responses.
async fn fan_out(ctx: Context, n: u32) -> Result<String, TerminalError> {
    let calls: Vec<_> = (1..=n)
        .map(|i| ctx.call::<_, String>(upper(), &i.to_string()))
        .collect();
    let mut responses = Vec::new();
    for call in calls.into_iter().rev() {
        let response = call.await?;
        ctx.set_state("last", &response)?;
        responses.push(response);
    }
    Ok(responses.join(","))
}

proptest! {
    #[test]
    fn prop_output_independent_of_completion_order(
        order in Just((1u32..=4).collect::<Vec<_>>()).prop_shuffle()
    ) {
        let mut script = vec![start(1), input("Till")];
        script.extend(order.iter().map(|i| completion(*i, &format!("R{}", i))));
        let outcome = TestDriver::new(|ctx| fan_out(ctx, 4)).run(script);

        prop_assert_eq!(outcome.output_value::<String>().unwrap(), "R4,R3,R2,R1");
        let states: Vec<_> = outcome
            .entries()
            .into_iter()
            .filter_map(|entry| match entry {
                Entry::SetState { value, .. } => Some(value.clone()),
                _ => None,
            })
            .collect();
        prop_assert_eq!(states, vec![json("R4"), json("R3"), json("R2"), json("R1")]);
    }
}
