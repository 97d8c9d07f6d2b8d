// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Replay determinism tests.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use common::*;
use reprise_core::{
    CloseReason, Completion, Entry, Failure, InboundMessage, LifecycleState, OutboundMessage,
    RunEnter, RunProposal, RunResult, VmError, VmOptions,
};

/// Live run: input, call, set state from the response, output.
fn live_run() -> (Vec<Entry>, Vec<OutboundMessage>) {
    let mut vm = with_input("Till");
    let name = vm.input().unwrap();
    assert_eq!(name, json("Till"));

    let call = vm.call(greeter(), name).unwrap();
    vm.notify(completion(1, "TILL")).unwrap();
    let response = vm.take_completion(&call).unwrap();
    let Completion::Success(upper) = response else {
        panic!("unexpected completion {:?}", response);
    };

    vm.set_state("last", upper.clone()).unwrap();
    vm.write_output(Ok(upper)).unwrap();

    let output = vm.take_output();
    let mut journal = vec![input_entry("Till")];
    journal.extend(sent_entries(&output));
    (journal, output)
}

#[test]
fn test_replay_reproduces_live_output() {
    let (journal, live_output) = live_run();
    assert_eq!(journal.len(), 4);
    assert!(matches!(
        live_output.last(),
        Some(OutboundMessage::Entry {
            index: 3,
            entry: Entry::Output { .. }
        })
    ));

    // The runtime stored the call together with its result.
    let mut historical = journal.clone();
    historical[1] = call_entry("Till", Some(Completion::Success(json("TILL"))));
    historical.pop();

    let mut vm = replaying(VmOptions::default(), historical);
    assert_eq!(vm.state(), LifecycleState::Replaying);

    let name = vm.input().unwrap();
    let call = vm.call(greeter(), name).unwrap();
    let Some(Completion::Success(upper)) = vm.take_completion(&call) else {
        panic!("replayed call should resolve from the journal");
    };
    vm.set_state("last", upper.clone()).unwrap();
    assert!(vm.is_processing());
    assert!(vm.take_output().is_empty());

    vm.write_output(Ok(upper)).unwrap();
    let replay_output = vm.take_output();
    assert_eq!(replay_output, vec![live_output.last().cloned().unwrap()]);
    assert_eq!(vm.close_reason(), Some(&CloseReason::Output));
}

#[test]
fn test_replay_mismatch_closes_with_journal_mismatch() {
    let mut vm = replaying(
        VmOptions::default(),
        vec![input_entry("Till"), call_entry("Till", None)],
    );
    vm.input().unwrap();

    let err = vm.sleep(Duration::from_secs(1)).unwrap_err();
    assert!(matches!(err, VmError::JournalMismatch { index: 1, .. }));
    assert!(vm.is_completed());
    assert!(matches!(
        vm.close_reason(),
        Some(CloseReason::Failed(VmError::JournalMismatch { .. }))
    ));

    let output = vm.take_output();
    assert_eq!(output.len(), 1);
    match &output[0] {
        OutboundMessage::Error {
            code,
            related_index,
            message,
        } => {
            assert_eq!(*code, 570);
            assert_eq!(*related_index, Some(1));
            assert!(message.contains("Call(Greeter/greet)"));
        }
        other => panic!("expected error, got {:?}", other),
    }
}

#[test]
fn test_replay_mismatch_on_call_target() {
    let mut vm = replaying(
        VmOptions::default(),
        vec![input_entry("Till"), call_entry("Till", None)],
    );
    vm.input().unwrap();

    let other = reprise_core::Target::new("Greeter", "farewell");
    let err = vm.call(other, json("Till")).unwrap_err();
    assert_eq!(err.code(), 570);
}

#[test]
fn test_known_entries_transition_happens_on_last_match() {
    let mut vm = replaying(
        VmOptions::default(),
        vec![
            input_entry("Till"),
            Entry::SetState {
                key: "A".into(),
                value: json("1"),
            },
        ],
    );
    vm.input().unwrap();
    assert!(vm.is_replaying());

    vm.set_state("A", json("1")).unwrap();
    assert!(vm.is_processing());

    vm.set_state("B", json("2")).unwrap();
    let output = vm.take_output();
    assert_eq!(
        output,
        vec![OutboundMessage::Entry {
            index: 2,
            entry: Entry::SetState {
                key: "B".into(),
                value: json("2"),
            },
        }]
    );
}

#[test]
fn test_completion_for_historical_entry_before_reissue() {
    let mut vm = replaying(
        VmOptions::default(),
        vec![input_entry("Till"), call_entry("Till", None)],
    );
    vm.notify(completion(1, "TILL")).unwrap();

    vm.input().unwrap();
    let call = vm.call(greeter(), json("Till")).unwrap();
    assert_eq!(
        vm.take_completion(&call),
        Some(Completion::Success(json("TILL")))
    );
}

#[test]
fn test_replayed_run_with_result_is_not_executed() {
    let mut vm = replaying(
        VmOptions::default(),
        vec![
            input_entry("Till"),
            Entry::Run {
                name: "random".into(),
                result: Some(Completion::Success(Bytes::from_static(b"4"))),
            },
        ],
    );
    vm.input().unwrap();

    let RunEnter::Executed(op) = vm.run("random").unwrap() else {
        panic!("run with a journaled result must not execute");
    };
    assert_eq!(
        vm.take_completion(&op),
        Some(Completion::Success(Bytes::from_static(b"4")))
    );
}

/// Executes the "flaky" run for one attempt and reports how often the closure ran.
fn attempt_flaky_run(retry_count: u32, executions: &AtomicU32) -> Vec<OutboundMessage> {
    let mut vm = reprise_core::InvocationStateMachine::default();
    vm.notify(InboundMessage::Start(reprise_core::StartInfo {
        invocation_id: Bytes::from_static(INVOCATION_ID),
        debug_id: "inv-0001".into(),
        known_entries: if retry_count == 0 { 1 } else { 2 },
        retry_count,
        ..Default::default()
    }))
    .unwrap();
    vm.notify(InboundMessage::Entry(input_entry("Till")))
        .unwrap();
    if retry_count > 0 {
        vm.notify(InboundMessage::Entry(Entry::Run {
            name: "flaky".into(),
            result: None,
        }))
        .unwrap();
    }

    vm.input().unwrap();
    match vm.run("flaky").unwrap() {
        RunEnter::NotExecuted(op) => {
            executions.fetch_add(1, Ordering::SeqCst);
            vm.propose_run_completion(
                op.index(),
                RunResult::Transient(Failure::new(503, "upstream unavailable")),
            )
            .unwrap();
        }
        RunEnter::Executed(_) => panic!("run has no result yet"),
    }

    assert!(vm.is_completed());
    assert_eq!(vm.close_reason(), Some(&CloseReason::RetryLater));
    vm.take_output()
}

#[test]
fn test_transient_run_failure_reported_once_per_attempt() {
    let executions = AtomicU32::new(0);

    let first = attempt_flaky_run(0, &executions);
    assert_eq!(executions.load(Ordering::SeqCst), 1);
    let proposals: Vec<_> = first
        .iter()
        .filter_map(|msg| match msg {
            OutboundMessage::ProposeRunCompletion {
                index,
                proposal: RunProposal::Transient(transient),
            } => Some((*index, transient.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(proposals.len(), 1);
    let (index, transient) = &proposals[0];
    assert_eq!(*index, 1);
    assert_eq!(transient.attempt, 1);
    assert_eq!(transient.next_retry_delay, Duration::from_millis(50));
    assert_eq!(transient.failure, Failure::new(503, "upstream unavailable"));

    // The runtime retries: the run entry replays and the closure runs again.
    let second = attempt_flaky_run(2, &executions);
    assert_eq!(executions.load(Ordering::SeqCst), 2);
    match second.as_slice() {
        [
            OutboundMessage::ProposeRunCompletion {
                proposal: RunProposal::Transient(transient),
                ..
            },
        ] => {
            assert_eq!(transient.attempt, 3);
            assert_eq!(transient.next_retry_delay, Duration::from_millis(200));
        }
        other => panic!("unexpected output {:?}", other),
    }
}

#[test]
fn test_transient_close_leaves_pending_run_unresolved() {
    let mut vm = with_input("Till");
    vm.input().unwrap();
    let op = vm.run("flaky").unwrap().operation();
    vm.propose_run_completion(op.index(), RunResult::Transient(Failure::new(500, "x")))
        .unwrap();

    assert_eq!(vm.take_completion(&op), None);
    assert_eq!(
        vm.set_state("A", Bytes::new()),
        Err(VmError::Closed),
        "nothing can be journaled after the invocation closed"
    );
}
