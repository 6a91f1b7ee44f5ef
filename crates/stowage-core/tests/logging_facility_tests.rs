//! Operation boundary logging
//!
//! ## Scenarios Covered
//! - Boundary macros emit canonical op/event fields
//! - Errors carry their stable code
//! - A save logs one start/end pair and its statement text
//! - A failed save logs end_error under the request id of the returned error

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::*;
use stowage_core::errors::StowageError;
use stowage_core::logging_facility::init_test_capture;
use stowage_core::{log_op_end, log_op_error, log_op_start};
use stowage_core_types::schema::{EVENT_END, EVENT_END_ERROR, EVENT_START};

#[test]
fn test_log_op_start_macro() {
    let capture = init_test_capture();
    let op_name = "test_log_op_start_unique_1";

    log_op_start!(op_name, object_count = 2);

    let events = capture.events();
    let start = events
        .iter()
        .find(|e| e.is(op_name, EVENT_START))
        .expect("start event captured");
    assert_eq!(start.fields.get("object_count"), Some(&"2".to_string()));
}

#[test]
fn test_log_op_end_macro() {
    let capture = init_test_capture();
    let op_name = "test_log_op_end_unique_2";

    log_op_end!(op_name, duration_ms = 42);

    let count = capture.count_events(|e| {
        e.is(op_name, EVENT_END)
    });
    assert_eq!(count, 1);
}

#[test]
fn test_log_op_error_includes_code() {
    let capture = init_test_capture();
    let op_name = "test_log_op_error_unique_3";

    log_op_error!(op_name, StowageError::QueueClosed, duration_ms = 10);

    let events = capture.events();
    let error = events
        .iter()
        .find(|e| e.is(op_name, EVENT_END_ERROR))
        .expect("error event captured");
    assert_eq!(
        error.fields.get("err.code"),
        Some(&"ERR_QUEUE_CLOSED".to_string())
    );
    assert!(error.fields.contains_key("err.kind"));
}

#[test]
fn test_save_emits_one_boundary_pair_and_statement_text() {
    // GIVEN a captured ready orchestrator
    let capture = init_test_capture();
    let (orchestrator, runner) = ready();
    let body = "logged-body-unique";

    // WHEN a note is saved
    orchestrator.save(&[note(body)]).unwrap();

    // THEN the insert text reached the sql target
    let insert = runner.statements().remove(0);
    assert!(capture.sql_statements().contains(&insert));

    // AND exactly one start and one end event carry the same request id
    let events = capture.events();
    let start = events
        .iter()
        .filter(|e| e.is("save", EVENT_START))
        .find(|e| {
            e.request_id().is_some_and(|id| {
                capture
                    .events_for_request(id)
                    .iter()
                    .any(|other| other.event() == Some(EVENT_END))
            })
        })
        .expect("save start with matching end");
    let request_id = start.request_id().unwrap();
    let scoped = capture.events_for_request(request_id);
    let starts = scoped
        .iter()
        .filter(|e| e.event() == Some(EVENT_START))
        .count();
    let ends = scoped
        .iter()
        .filter(|e| e.event() == Some(EVENT_END))
        .count();
    assert_eq!((starts, ends), (1, 1));
}

#[test]
fn test_failed_operation_emits_error_with_request_id() {
    let capture = init_test_capture();
    let (orchestrator, runner) = ready();
    runner.fail_on("INSERT");

    let err = orchestrator.save(&[note("fails")]).unwrap_err();

    let request_id = err.request_id().unwrap().as_str().to_string();
    let scoped = capture.events_for_request(&request_id);
    let error = scoped
        .iter()
        .find(|e| e.event() == Some(EVENT_END_ERROR))
        .expect("error event for the failed save");
    assert_eq!(
        error.fields.get("err.code"),
        Some(&"ERR_STATEMENT_EXECUTION".to_string())
    );
    assert!(!scoped.iter().any(|e| e.event() == Some(EVENT_END)));
}
