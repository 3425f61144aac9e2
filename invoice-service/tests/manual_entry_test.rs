//! Manual invoice entry and status transition tests for invoice-service.

mod common;

use chrono::NaiveDate;
use common::{MemoryStore, OTHER_NIP, SUPPLIER_NIP};
use invoice_service::models::{
    Actor, CreateAssignmentRule, InvoiceDirection, InvoiceStatus, ModuleType, RuleKind,
};
use invoice_service::services::store::RuleStore;
use invoice_service::services::{
    AuditLog, InvoiceLocks, InvoiceService, ManualInvoiceInput, RuleEngine,
};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

fn service(store: &Arc<MemoryStore>) -> InvoiceService {
    InvoiceService::new(
        store.clone(),
        RuleEngine::new(store.clone()),
        AuditLog::new(store.clone()),
        Arc::new(InvoiceLocks::new()),
    )
}

fn actor() -> Actor {
    Actor::user(Uuid::new_v4(), "jan.kowalski")
}

fn input() -> ManualInvoiceInput {
    ManualInvoiceInput {
        external_reference: None,
        direction: InvoiceDirection::Purchase,
        seller_name: "Wytwornia Pasz ACME Sp. z o.o.".to_string(),
        seller_tax_id: Some(SUPPLIER_NIP.to_string()),
        buyer_name: "Gospodarstwo Rolne Testowe".to_string(),
        buyer_tax_id: Some(OTHER_NIP.to_string()),
        invoice_number: "FV/100/2026".to_string(),
        issue_date: NaiveDate::from_ymd_opt(2026, 4, 10).unwrap(),
        net_amount: Decimal::new(10000, 2),
        tax_amount: Decimal::new(2300, 2),
        gross_amount: Decimal::new(12300, 2),
        currency: "PLN".to_string(),
        description: Some("pasza dla niosek".to_string()),
    }
}

#[tokio::test]
async fn creates_invoice_with_audit_trail() {
    let store = Arc::new(MemoryStore::new());
    let service = service(&store);

    let invoice = service.create_manual(input(), actor()).await.unwrap();
    assert_eq!(invoice.status(), InvoiceStatus::New);
    assert_eq!(invoice.source, "manual");
    assert!(invoice.external_reference.is_none());

    let events = store.events_for(invoice.invoice_id);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, "manual_entry");
    assert_eq!(events[0].actor_name, "jan.kowalski");
}

#[tokio::test]
async fn manual_entry_reuses_the_rule_engine() {
    let store = Arc::new(MemoryStore::new());
    let rules: Arc<dyn RuleStore> = store.clone();
    rules
        .insert(CreateAssignmentRule {
            kind: RuleKind::Module,
            match_tax_id: None,
            match_text: Some("pasza".to_string()),
            target_user_id: None,
            target_module: Some(ModuleType::Feed),
            target_farm_id: None,
        })
        .await
        .unwrap();

    let service = service(&store);
    let invoice = service.create_manual(input(), actor()).await.unwrap();

    assert_eq!(invoice.status(), InvoiceStatus::Assigned);
    assert_eq!(invoice.assigned_module(), Some(ModuleType::Feed));

    let events = store.events_for(invoice.invoice_id);
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].action, "assigned");
}

#[tokio::test]
async fn duplicate_external_reference_is_rejected_synchronously() {
    let store = Arc::new(MemoryStore::new());
    let service = service(&store);

    let mut first = input();
    first.external_reference = Some("ksef-900".to_string());
    service.create_manual(first, actor()).await.unwrap();

    let mut second = input();
    second.external_reference = Some("ksef-900".to_string());
    second.invoice_number = "FV/101/2026".to_string();
    let err = service.create_manual(second, actor()).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(store.invoice_count(), 1);
}

#[tokio::test]
async fn blank_seller_name_fails_validation() {
    let store = Arc::new(MemoryStore::new());
    let service = service(&store);

    let mut bad = input();
    bad.seller_name = String::new();
    let err = service.create_manual(bad, actor()).await.unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));
}

#[tokio::test]
async fn invalid_nip_checksum_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let service = service(&store);

    let mut bad = input();
    bad.seller_tax_id = Some("5260250275".to_string());
    let err = service.create_manual(bad, actor()).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn unbalanced_amounts_are_rejected() {
    let store = Arc::new(MemoryStore::new());
    let service = service(&store);

    let mut bad = input();
    bad.gross_amount = Decimal::new(12301, 2); // 123.01 vs net 100.00 + tax 23.00
    let err = service.create_manual(bad, actor()).await.unwrap_err();
    assert!(matches!(err, AppError::MalformedDocument(_)));
}

#[tokio::test]
async fn status_change_writes_one_audit_event() {
    let store = Arc::new(MemoryStore::new());
    let service = service(&store);
    let invoice = service.create_manual(input(), actor()).await.unwrap();

    service
        .change_status(
            invoice.invoice_id,
            InvoiceStatus::Confirmed,
            actor(),
            Some("zgodna z dostawa".to_string()),
        )
        .await
        .unwrap();

    let updated = service.get(invoice.invoice_id).await.unwrap();
    assert_eq!(updated.status(), InvoiceStatus::Confirmed);

    let events = store.events_for(invoice.invoice_id);
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].action, "status_changed");
    assert_eq!(events[1].previous_status.as_deref(), Some("new"));
    assert_eq!(events[1].new_status.as_deref(), Some("confirmed"));
}

#[tokio::test]
async fn terminal_statuses_reject_further_transitions() {
    let store = Arc::new(MemoryStore::new());
    let service = service(&store);
    let invoice = service.create_manual(input(), actor()).await.unwrap();

    service
        .change_status(invoice.invoice_id, InvoiceStatus::Confirmed, actor(), None)
        .await
        .unwrap();
    let err = service
        .change_status(invoice.invoice_id, InvoiceStatus::Rejected, actor(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn audit_failure_leaves_status_unchanged() {
    let store = Arc::new(MemoryStore::new());
    let service = service(&store);
    let invoice = service.create_manual(input(), actor()).await.unwrap();

    store.fail_audit_appends(true);
    let err = service
        .change_status(invoice.invoice_id, InvoiceStatus::Confirmed, actor(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DatabaseError(_)));

    store.fail_audit_appends(false);
    let unchanged = service.get(invoice.invoice_id).await.unwrap();
    assert_eq!(unchanged.status(), InvoiceStatus::New);
    assert_eq!(store.events_for(invoice.invoice_id).len(), 1); // manual_entry only
}

#[tokio::test]
async fn soft_deleted_invoice_is_gone_from_reads() {
    let store = Arc::new(MemoryStore::new());
    let service = service(&store);
    let invoice = service.create_manual(input(), actor()).await.unwrap();

    service.soft_delete(invoice.invoice_id).await.unwrap();
    let err = service.get(invoice.invoice_id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    // the row itself is kept
    assert_eq!(store.invoice_count(), 1);
}
