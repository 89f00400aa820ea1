//! End-to-end tests for the enrollment workflow against a scripted invoker.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use serde_json::json;

use clubjoin_core::enrollment::MembershipCategory;
use clubjoin_core::procedure::{ProcParam, Procedure};
use clubjoin_events::bus::{EVENT_ENROLLMENT_COMPLETED, EVENT_RECONCILIATION_REQUIRED};
use clubjoin_events::EventBus;
use clubjoin_pipeline::{
    EnrollmentConfig, EnrollmentError, EnrollmentOutcome, EnrollmentReceipt, EnrollmentWorkflow,
    WriteStep,
};

use common::*;

fn completed(outcome: EnrollmentOutcome) -> EnrollmentReceipt {
    match outcome {
        EnrollmentOutcome::Completed(receipt) => *receipt,
        other => panic!("expected completed enrollment, got {other:?}"),
    }
}

fn with_family() -> serde_json::Value {
    let mut value = request_json();
    value["familyMembers"] = json!([
        {"firstName": "Kid", "lastName": "Ortiz", "dateOfBirth": "2016-05-01", "gender": "M", "memberType": "child"},
        {"firstName": "Luis", "lastName": "Ortiz", "dateOfBirth": "1987-07-07", "gender": "M", "memberType": "adult"},
        {"firstName": "Teen", "lastName": "Ortiz", "dateOfBirth": "2011-03-03", "gender": "F", "memberType": "youth"},
        {"firstName": "Rosa", "lastName": "Ortiz", "dateOfBirth": "1960-01-20", "gender": "F", "memberType": "adult"}
    ]);
    value
}

fn with_addon() -> serde_json::Value {
    let mut value = request_json();
    value["serviceAddons"] = json!([
        {"upc": "KC100", "description": "Kids Club", "monthlyPrice": 20.00}
    ]);
    value
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn runs_every_step_in_order() {
    let invoker = RecordingInvoker::new();
    let store = Arc::new(MemoryContractStore::default());
    let enrollment = priced(request_from(with_addon()));

    let outcome = workflow(invoker.clone(), store)
        .run_at(&enrollment, today(), now())
        .await
        .unwrap();
    let receipt = completed(outcome);

    assert_eq!(
        invoker.procedures(),
        vec![
            Procedure::NextMembershipId,
            Procedure::InsertMembership,
            Procedure::InsertMember,
            Procedure::InsertMessage,
            Procedure::InsertContract,
            Procedure::InsertReceipt,
            Procedure::InsertReceipt,
            Procedure::FinalizeProduction,
            Procedure::InsertUpcItem,
            Procedure::InsertUpcItem,
        ]
    );
    assert_eq!(receipt.customer_code.as_str(), ALLOCATED_CODE);
    assert_eq!(receipt.migration.transaction_id, "TX-1001");
    assert_eq!(receipt.migration.result_code, 0);
    assert!(!receipt.needs_reconciliation());
}

#[tokio::test]
async fn amounts_are_prorated_and_rounded_per_step() {
    let invoker = RecordingInvoker::new();
    let enrollment = priced(request_from(request_json()));

    let receipt = completed(
        workflow(invoker, Arc::new(MemoryContractStore::default()))
            .run_at(&enrollment, today(), now())
            .await
            .unwrap(),
    );

    // April 16 of a 30-day month: 15 of 30 days remain.
    assert_eq!(receipt.proration.days_remaining, 15);
    assert_eq!(receipt.proration.prorated_dues, d("30.00"));
    // (49.00 + 30.00) * 0.07875 = 6.22125
    assert_eq!(receipt.proration.prorated_dues_tax, d("6.22"));
    assert_eq!(receipt.amount_billed, d("85.22"));
}

#[tokio::test]
async fn every_write_uses_the_allocated_code() {
    let invoker = RecordingInvoker::new();
    let enrollment = priced(request_from(with_family()));

    workflow(invoker.clone(), Arc::new(MemoryContractStore::default()))
        .run_at(&enrollment, today(), now())
        .await
        .unwrap();

    for call in invoker.calls().iter().skip(1) {
        let first = call.text(0).unwrap_or_default();
        assert!(
            first.starts_with(ALLOCATED_CODE),
            "{:?} was not keyed by the customer code",
            call.procedure()
        );
    }
}

// ---------------------------------------------------------------------------
// Membership writer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn member_codes_follow_adults_then_dependents() {
    let invoker = RecordingInvoker::new();
    let enrollment = priced(request_from(with_family()));

    workflow(invoker.clone(), Arc::new(MemoryContractStore::default()))
        .run_at(&enrollment, today(), now())
        .await
        .unwrap();

    let members: Vec<_> = invoker
        .calls_to(Procedure::InsertMember)
        .iter()
        .map(|c| {
            (
                c.int(1).unwrap(),
                c.text(2).unwrap().to_string(),
                c.text(3).unwrap().to_string(),
            )
        })
        .collect();

    assert_eq!(
        members,
        vec![
            (0, "P".into(), "Ana".into()),
            (1, "S".into(), "Luis".into()),
            (2, "S".into(), "Rosa".into()),
            (3, "D".into(), "Kid".into()),
            (4, "D".into(), "Teen".into()),
        ]
    );
}

#[tokio::test]
async fn membership_row_carries_derived_fields() {
    let invoker = RecordingInvoker::new();
    let enrollment = priced(request_from(request_json()));

    workflow(invoker.clone(), Arc::new(MemoryContractStore::default()))
        .run_at(&enrollment, today(), now())
        .await
        .unwrap();

    let membership = &invoker.calls_to(Procedure::InsertMembership)[0];
    assert_eq!(membership.text(0), Some(ALLOCATED_CODE));
    assert_eq!(membership.text(1), Some(ALLOCATED_CODE), "bridge mirrors code");
    assert_eq!(membership.text(2), Some("007"));
    assert_eq!(membership.text(3), Some("ANA M. ORTIZ"));
    // Blank cell phone falls through to home.
    assert_eq!(membership.text(12), Some("5055550101"));
    assert_eq!(membership.text(21), Some("09/28"));

    let message = &invoker.calls_to(Procedure::InsertMessage)[0];
    assert_eq!(message.text(1), Some("Join: 04/16/2026 Net: $60.00"));
}

#[tokio::test]
async fn guardian_is_member_code_one() {
    let invoker = RecordingInvoker::new();
    let mut value = request_json();
    value["specialty"] = json!("junior");
    value["guardian"] = json!({"firstName": "Marta", "lastName": "Ortiz", "relationship": "mother"});
    let enrollment = priced(request_from(value));

    workflow(invoker.clone(), Arc::new(MemoryContractStore::default()))
        .run_at(&enrollment, today(), now())
        .await
        .unwrap();

    let members = invoker.calls_to(Procedure::InsertMember);
    assert_eq!(members.len(), 2);
    assert_eq!(members[1].int(1), Some(1));
    assert_eq!(members[1].text(2), Some("G"));
    assert_eq!(members[1].text(3), Some("Marta"));
}

#[tokio::test]
async fn contract_records_gross_and_net() {
    let invoker = RecordingInvoker::new();
    let enrollment = priced(request_from(with_addon()));

    workflow(invoker.clone(), Arc::new(MemoryContractStore::default()))
        .run_at(&enrollment, today(), now())
        .await
        .unwrap();

    let contract = &invoker.calls_to(Procedure::InsertContract)[0];
    assert_eq!(contract.text(3), Some("80.00"));
    assert_eq!(contract.text(4), Some("60.00"));
}

#[tokio::test]
async fn join_message_failure_does_not_abort() {
    let invoker = RecordingInvoker::new();
    invoker.fail(Procedure::InsertMessage);
    let enrollment = priced(request_from(request_json()));

    let outcome = workflow(invoker.clone(), Arc::new(MemoryContractStore::default()))
        .run_at(&enrollment, today(), now())
        .await;

    assert_matches!(outcome, Ok(EnrollmentOutcome::Completed(_)));
    assert_eq!(invoker.calls_to(Procedure::InsertContract).len(), 1);
}

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn receipt_lines_for_dues_and_addons() {
    let invoker = RecordingInvoker::new();
    let enrollment = priced(request_from(with_addon()));

    workflow(invoker.clone(), Arc::new(MemoryContractStore::default()))
        .run_at(&enrollment, today(), now())
        .await
        .unwrap();

    let lines = invoker.calls_to(Procedure::InsertReceipt);
    assert_eq!(lines.len(), 2);

    assert_eq!(lines[0].text(0), Some("100482-01"));
    assert_eq!(lines[0].text(2), Some("60.00"));
    assert_eq!(lines[0].text(3), Some("D"));

    assert_eq!(lines[1].text(0), Some("100482-02"));
    assert_eq!(lines[1].text(2), Some("20.00"));
    assert_eq!(lines[1].text(3), Some("B"));
    assert_eq!(lines[1].text(4), Some("KC100"));
    assert_eq!(lines[1].text(5), Some("KIDS CLUB"));
    assert_eq!(
        lines[1].params()[6],
        ProcParam::Date(chrono::NaiveDate::from_ymd_opt(2026, 5, 1).unwrap())
    );
}

#[tokio::test]
async fn failed_receipt_line_is_skipped() {
    let invoker = RecordingInvoker::new();
    invoker.fail_nth(Procedure::InsertReceipt, 0);
    let enrollment = priced(request_from(with_addon()));

    let receipt = completed(
        workflow(invoker.clone(), Arc::new(MemoryContractStore::default()))
            .run_at(&enrollment, today(), now())
            .await
            .unwrap(),
    );

    assert_eq!(receipt.receipts.written, 1);
    assert_eq!(receipt.receipts.failed, 1);
    assert_eq!(invoker.calls_to(Procedure::FinalizeProduction).len(), 1);
}

// ---------------------------------------------------------------------------
// Production migration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn migration_call_failure_still_succeeds() {
    let invoker = RecordingInvoker::new();
    invoker.fail(Procedure::FinalizeProduction);
    let enrollment = priced(request_from(with_addon()));

    let receipt = completed(
        workflow(invoker.clone(), Arc::new(MemoryContractStore::default()))
            .run_at(&enrollment, today(), now())
            .await
            .unwrap(),
    );

    assert_eq!(receipt.migration.result_code, -1);
    let digits = receipt
        .migration
        .transaction_id
        .strip_prefix("TEMP_")
        .expect("synthetic transaction id");
    assert!(!digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()));
    assert!(receipt.needs_reconciliation());
    assert!(invoker.calls_to(Procedure::InsertUpcItem).is_empty());
}

#[tokio::test]
async fn nonzero_result_code_skips_upc_items() {
    let invoker = RecordingInvoker::new();
    invoker.respond(
        Procedure::FinalizeProduction,
        vec![finalize_row(3, "", "TX-9")],
    );
    let enrollment = priced(request_from(request_json()));

    let receipt = completed(
        workflow(invoker.clone(), Arc::new(MemoryContractStore::default()))
            .run_at(&enrollment, today(), now())
            .await
            .unwrap(),
    );

    assert_eq!(receipt.migration.result_code, 3);
    assert_eq!(receipt.migration.transaction_id, "TX-9");
    assert!(invoker.calls_to(Procedure::InsertUpcItem).is_empty());
}

#[tokio::test]
async fn upc_items_use_updated_code_and_proportional_prices() {
    let invoker = RecordingInvoker::new();
    invoker.respond(
        Procedure::FinalizeProduction,
        vec![finalize_row(0, "200310", "TX-77")],
    );
    let mut enrollment = priced(request_from(with_addon()));
    enrollment.pt_package = Some(pt_package());

    let receipt = completed(
        workflow(invoker.clone(), Arc::new(MemoryContractStore::default()))
            .run_at(&enrollment, today(), now())
            .await
            .unwrap(),
    );
    assert_eq!(receipt.customer_code.as_str(), "200310");

    let items = invoker.calls_to(Procedure::InsertUpcItem);
    assert_eq!(items.len(), 3);
    for item in &items {
        assert_eq!(item.text(0), Some("200310"));
        assert_eq!(item.text(1), Some("TX-77"));
    }
    // Dues at the configured UPC.
    assert_eq!(items[0].text(2), Some("PRORATED-DUES"));
    assert_eq!(items[0].text(4), Some("30.00"));
    // Add-on prorated by 30.00 / 60.00; tax 10.00 * 0.07875 = 0.7875.
    assert_eq!(items[1].text(2), Some("KC100"));
    assert_eq!(items[1].text(4), Some("10.00"));
    assert_eq!(items[1].text(5), Some("0.79"));
    // PT package at full price, untaxed.
    assert_eq!(items[2].text(2), Some("PT-004"));
    assert_eq!(items[2].text(4), Some("199.00"));
    assert_eq!(items[2].text(5), Some("0.00"));
}

// ---------------------------------------------------------------------------
// Allocation fallback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fallback_allocation_returns_before_downstream_writes() {
    let invoker = RecordingInvoker::new();
    invoker.fail(Procedure::NextMembershipId);
    invoker.respond_to_lookup(vec![text_row("customer_code", FALLBACK_CODE)]);
    let enrollment = priced(request_from(with_family()));

    let outcome = workflow(invoker.clone(), Arc::new(MemoryContractStore::default()))
        .run_at(&enrollment, today(), now())
        .await
        .unwrap();

    assert_matches!(
        outcome,
        EnrollmentOutcome::FallbackRecorded { ref customer_code } if customer_code.as_str() == FALLBACK_CODE
    );
    assert_eq!(
        invoker.procedures(),
        vec![Procedure::NextMembershipId, Procedure::InsertMembership]
    );

    let membership = &invoker.calls_to(Procedure::InsertMembership)[0];
    assert_eq!(membership.text(0), Some(""));
    assert_eq!(membership.text(1), Some(""));

    let lookup = invoker.calls().last().cloned().unwrap();
    assert_eq!(lookup.procedure(), None);
    assert_eq!(lookup.text(0), Some("ANA M. ORTIZ"));
    assert_eq!(lookup.text(1), Some("ana@example.com"));
}

#[tokio::test]
async fn blank_allocation_result_uses_fallback() {
    let invoker = RecordingInvoker::new();
    invoker.respond(Procedure::NextMembershipId, vec![text_row("next_id", "  ")]);
    invoker.respond_to_lookup(vec![text_row("customer_code", FALLBACK_CODE)]);
    let enrollment = priced(request_from(request_json()));

    let outcome = workflow(invoker, Arc::new(MemoryContractStore::default()))
        .run_at(&enrollment, today(), now())
        .await
        .unwrap();

    assert_matches!(outcome, EnrollmentOutcome::FallbackRecorded { .. });
}

#[tokio::test]
async fn allocation_fails_when_fallback_finds_nothing() {
    let invoker = RecordingInvoker::new();
    invoker.fail(Procedure::NextMembershipId);
    let enrollment = priced(request_from(request_json()));

    let result = workflow(invoker, Arc::new(MemoryContractStore::default()))
        .run_at(&enrollment, today(), now())
        .await;

    assert_matches!(result, Err(EnrollmentError::Allocation(_)));
}

// ---------------------------------------------------------------------------
// Abort and compensation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn primary_member_failure_aborts_and_purges() {
    let invoker = RecordingInvoker::new();
    invoker.fail(Procedure::InsertMember);
    let enrollment = priced(request_from(with_addon()));

    let result = workflow(invoker.clone(), Arc::new(MemoryContractStore::default()))
        .run_at(&enrollment, today(), now())
        .await;

    assert_matches!(
        result,
        Err(EnrollmentError::MembershipWrite {
            step: WriteStep::PrimaryMember,
            ..
        })
    );
    let purge = invoker.calls_to(Procedure::PurgeStagedEnrollment);
    assert_eq!(purge.len(), 1);
    assert_eq!(purge[0].text(0), Some(ALLOCATED_CODE));
    assert!(invoker.calls_to(Procedure::InsertReceipt).is_empty());
    assert!(invoker.calls_to(Procedure::FinalizeProduction).is_empty());
}

#[tokio::test]
async fn family_member_failure_names_the_member() {
    let invoker = RecordingInvoker::new();
    invoker.fail_nth(Procedure::InsertMember, 2);
    let enrollment = priced(request_from(with_family()));

    let result = workflow(invoker, Arc::new(MemoryContractStore::default()))
        .run_at(&enrollment, today(), now())
        .await;

    assert_matches!(
        result,
        Err(EnrollmentError::MembershipWrite {
            step: WriteStep::FamilyMember { member_code: 2 },
            ..
        })
    );
}

#[tokio::test]
async fn guardian_failure_aborts_and_purges() {
    let invoker = RecordingInvoker::new();
    // Call 0 is the primary member, call 1 the guardian.
    invoker.fail_nth(Procedure::InsertMember, 1);
    let mut value = request_json();
    value["specialty"] = json!("junior");
    value["guardian"] = json!({"firstName": "Marta", "lastName": "Ortiz"});
    let enrollment = priced(request_from(value));

    let result = workflow(invoker.clone(), Arc::new(MemoryContractStore::default()))
        .run_at(&enrollment, today(), now())
        .await;

    assert_matches!(
        result,
        Err(EnrollmentError::MembershipWrite {
            step: WriteStep::Guardian,
            ..
        })
    );
    let members = invoker.calls_to(Procedure::InsertMember);
    assert_eq!(members[1].text(2), Some("G"));
    let purge = invoker.calls_to(Procedure::PurgeStagedEnrollment);
    assert_eq!(purge.len(), 1);
    assert_eq!(purge[0].text(0), Some(ALLOCATED_CODE));
    assert!(invoker.calls_to(Procedure::InsertContract).is_empty());
    assert!(invoker.calls_to(Procedure::FinalizeProduction).is_empty());
}

#[tokio::test]
async fn contract_failure_aborts_and_purges() {
    let invoker = RecordingInvoker::new();
    invoker.fail(Procedure::InsertContract);
    let enrollment = priced(request_from(with_addon()));

    let result = workflow(invoker.clone(), Arc::new(MemoryContractStore::default()))
        .run_at(&enrollment, today(), now())
        .await;

    assert_matches!(
        result,
        Err(EnrollmentError::MembershipWrite {
            step: WriteStep::Contract,
            ..
        })
    );
    let purge = invoker.calls_to(Procedure::PurgeStagedEnrollment);
    assert_eq!(purge.len(), 1);
    assert_eq!(purge[0].text(0), Some(ALLOCATED_CODE));
    assert!(invoker.calls_to(Procedure::InsertReceipt).is_empty());
    assert!(invoker.calls_to(Procedure::FinalizeProduction).is_empty());
}

#[tokio::test]
async fn membership_insert_failure_has_nothing_to_purge() {
    let invoker = RecordingInvoker::new();
    invoker.fail(Procedure::InsertMembership);
    let enrollment = priced(request_from(request_json()));

    let result = workflow(invoker.clone(), Arc::new(MemoryContractStore::default()))
        .run_at(&enrollment, today(), now())
        .await;

    assert_matches!(
        result,
        Err(EnrollmentError::MembershipWrite {
            step: WriteStep::Membership,
            ..
        })
    );
    assert!(invoker.calls_to(Procedure::PurgeStagedEnrollment).is_empty());
}

#[tokio::test]
async fn compensation_can_be_disabled() {
    let invoker = RecordingInvoker::new();
    invoker.fail(Procedure::InsertContract);
    let enrollment = priced(request_from(request_json()));
    let config = EnrollmentConfig {
        compensate_on_abort: false,
        ..EnrollmentConfig::default()
    };

    let result = EnrollmentWorkflow::new(
        invoker.clone(),
        Arc::new(MemoryContractStore::default()),
        config,
    )
    .run_at(&enrollment, today(), now())
    .await;

    assert_matches!(
        result,
        Err(EnrollmentError::MembershipWrite {
            step: WriteStep::Contract,
            ..
        })
    );
    assert!(invoker.calls_to(Procedure::PurgeStagedEnrollment).is_empty());
}

#[tokio::test]
async fn failed_purge_keeps_original_error() {
    let invoker = RecordingInvoker::new();
    invoker.fail(Procedure::InsertContract);
    invoker.fail(Procedure::PurgeStagedEnrollment);
    let enrollment = priced(request_from(request_json()));

    let result = workflow(invoker, Arc::new(MemoryContractStore::default()))
        .run_at(&enrollment, today(), now())
        .await;

    assert_matches!(
        result,
        Err(EnrollmentError::MembershipWrite {
            step: WriteStep::Contract,
            ..
        })
    );
}

// ---------------------------------------------------------------------------
// Contract archive
// ---------------------------------------------------------------------------

#[tokio::test]
async fn contract_is_archived_under_final_code() {
    let invoker = RecordingInvoker::new();
    invoker.respond(
        Procedure::FinalizeProduction,
        vec![finalize_row(0, "200310", "TX-77")],
    );
    let store = Arc::new(MemoryContractStore::default());
    let mut value = request_json();
    // "%PDF" base64-encoded with a data-URL prefix.
    value["contractDocument"] = json!("data:application/pdf;base64,JVBERg==");
    let enrollment = priced(request_from(value));

    let receipt = completed(
        workflow(invoker, store.clone())
            .run_at(&enrollment, today(), now())
            .await
            .unwrap(),
    );

    let saved = store.saved.lock().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].0, "04-16-2026 200310 Ana Ortiz ONLINE.pdf");
    assert_eq!(saved[0].1, b"%PDF");
    assert!(receipt.contract_path.is_some());
}

#[tokio::test]
async fn missing_contract_is_not_archived() {
    let store = Arc::new(MemoryContractStore::default());
    let enrollment = priced(request_from(request_json()));

    let receipt = completed(
        workflow(RecordingInvoker::new(), store.clone())
            .run_at(&enrollment, today(), now())
            .await
            .unwrap(),
    );

    assert!(store.saved.lock().unwrap().is_empty());
    assert!(receipt.contract_path.is_none());
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publishes_completion_and_reconciliation_events() {
    let invoker = RecordingInvoker::new();
    invoker.fail(Procedure::FinalizeProduction);
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let enrollment = priced(request_from(request_json()));

    workflow(invoker, Arc::new(MemoryContractStore::default()))
        .with_events(bus.clone())
        .run_at(&enrollment, today(), now())
        .await
        .unwrap();

    let first = rx.recv().await.unwrap();
    assert_eq!(first.event_type, EVENT_ENROLLMENT_COMPLETED);
    assert_eq!(first.payload_str("email"), Some("ana@example.com"));
    assert_eq!(first.payload_str("amountBilled"), Some("85.22"));

    let second = rx.recv().await.unwrap();
    assert_eq!(second.event_type, EVENT_RECONCILIATION_REQUIRED);
    assert_eq!(second.customer_code.as_deref(), Some(ALLOCATED_CODE));
}

// ---------------------------------------------------------------------------
// Category derivation
// ---------------------------------------------------------------------------

#[test]
fn new_mexico_two_adults_and_child_is_family() {
    let mut value = request_json();
    value["familyMembers"] = json!([
        {"firstName": "Luis", "lastName": "Ortiz", "dateOfBirth": "1987-07-07", "gender": "M", "memberType": "adult"},
        {"firstName": "Kid", "lastName": "Ortiz", "dateOfBirth": "2016-05-01", "gender": "M", "memberType": "child"}
    ]);
    assert_eq!(category(value, "nm"), MembershipCategory::Family);
}

#[test]
fn standard_tenant_two_adults_is_dual() {
    let mut value = request_json();
    value["familyMembers"] = json!([
        {"firstName": "Luis", "lastName": "Ortiz", "dateOfBirth": "1987-07-07", "gender": "M", "memberType": "adult"}
    ]);
    assert_eq!(category(value, "az"), MembershipCategory::Dual);
}
