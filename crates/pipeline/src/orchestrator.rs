//! Enrollment workflow orchestrator.
//!
//! Sequences allocation, membership writes, receipts, the production
//! mirror and the contract archive for one enrollment:
//!
//! 1. Allocate a customer code. The fallback path ends the workflow early.
//! 2. Insert the membership and the primary member.
//! 3. Insert family members (adults, then dependents) and the guardian.
//! 4. Insert the join message (auxiliary) and the contract record.
//! 5. Insert receipt lines (each independent).
//! 6. Mirror to production (tolerated failure).
//! 7. Archive the contract document (tolerated failure).
//!
//! A failure in steps 2-4 aborts the request. When the membership row
//! already exists, a compensating purge removes the staged rows before the
//! error is returned.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use clubjoin_core::enrollment::{EnrollmentRequest, MembershipCategory, ServiceAddon};
use clubjoin_core::naming::business_name;
use clubjoin_core::pricing::PtPackage;
use clubjoin_core::procedure::{ProcParam, Procedure, ProcedureInvoker};
use clubjoin_core::proration::{first_of_next_month, prorate, ProrationInput, ProrationResult};
use clubjoin_core::types::{format_money, CustomerCode, TenantId};
use clubjoin_events::bus::{
    EVENT_ENROLLMENT_ABORTED, EVENT_ENROLLMENT_COMPLETED, EVENT_FALLBACK_RECORDED,
    EVENT_RECONCILIATION_REQUIRED,
};
use clubjoin_events::{EnrollmentEvent, EventBus};

use crate::allocator::{Allocation, CustomerCodeAllocator};
use crate::archive::{archive_contract, ContractStore};
use crate::config::EnrollmentConfig;
use crate::error::EnrollmentError;
use crate::membership::MembershipWriter;
use crate::migration::{ProductionMigrationResult, ProductionMigrator};
use crate::receipts::{receipt_lines, ReceiptSummary, ReceiptWriter};

// ---------------------------------------------------------------------------
// PricedEnrollment
// ---------------------------------------------------------------------------

/// A validated request with its catalog prices resolved.
///
/// Add-on lists on `request` already hold catalog entries.
#[derive(Debug, Clone)]
pub struct PricedEnrollment {
    pub tenant: TenantId,
    pub request: EnrollmentRequest,
    pub category: MembershipCategory,
    /// Net monthly dues for the category and specialty.
    pub monthly_dues: Decimal,
    /// Effective sales tax rate; zero for non-taxed tenants.
    pub tax_rate: Decimal,
    pub pt_package: Option<PtPackage>,
}

impl PricedEnrollment {
    pub fn business_name(&self) -> String {
        let primary = &self.request.primary;
        business_name(
            &primary.first_name,
            primary.middle_initial.as_deref(),
            &primary.last_name,
        )
    }

    /// Service add-ons followed by child add-ons.
    pub fn all_addons(&self) -> impl Iterator<Item = &ServiceAddon> {
        self.request
            .service_addons
            .iter()
            .chain(&self.request.child_addons)
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Summary of a completed enrollment.
#[derive(Debug, Clone)]
pub struct EnrollmentReceipt {
    pub customer_code: CustomerCode,
    pub migration: ProductionMigrationResult,
    pub amount_billed: Decimal,
    pub proration: ProrationResult,
    pub receipts: ReceiptSummary,
    pub contract_path: Option<PathBuf>,
}

impl EnrollmentReceipt {
    /// Non-zero migration result codes need operator follow-up.
    pub fn needs_reconciliation(&self) -> bool {
        !self.migration.succeeded()
    }
}

#[derive(Debug, Clone)]
pub enum EnrollmentOutcome {
    Completed(Box<EnrollmentReceipt>),
    /// Only the fallback membership row was written.
    FallbackRecorded { customer_code: CustomerCode },
}

/// Workflow position, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkflowState {
    Allocating,
    FallbackReturned,
    WritingMembership,
    WritingFamily,
    WritingGuardian,
    WritingMessageAndContract,
    WritingReceipts,
    MigratingProduction,
    ArchivingContract,
    Responding,
    Aborted,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Allocating => "allocating",
            Self::FallbackReturned => "fallback_returned",
            Self::WritingMembership => "writing_membership",
            Self::WritingFamily => "writing_family",
            Self::WritingGuardian => "writing_guardian",
            Self::WritingMessageAndContract => "writing_message_and_contract",
            Self::WritingReceipts => "writing_receipts",
            Self::MigratingProduction => "migrating_production",
            Self::ArchivingContract => "archiving_contract",
            Self::Responding => "responding",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// EnrollmentWorkflow
// ---------------------------------------------------------------------------

/// Runs enrollments. Held in application state as `Arc<EnrollmentWorkflow>`.
pub struct EnrollmentWorkflow {
    invoker: Arc<dyn ProcedureInvoker>,
    contracts: Arc<dyn ContractStore>,
    events: Option<Arc<EventBus>>,
    config: EnrollmentConfig,
}

impl EnrollmentWorkflow {
    pub fn new(
        invoker: Arc<dyn ProcedureInvoker>,
        contracts: Arc<dyn ContractStore>,
        config: EnrollmentConfig,
    ) -> Self {
        Self {
            invoker,
            contracts,
            events: None,
            config,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &EnrollmentConfig {
        &self.config
    }

    /// Tax rate after applying the non-taxed tenant list.
    pub fn effective_tax_rate(&self, tenant: &TenantId, catalog_rate: Decimal) -> Decimal {
        if self.config.is_taxed(tenant) {
            catalog_rate
        } else {
            Decimal::ZERO
        }
    }

    /// Amounts due for `enrollment` as of `today`. Writes nothing.
    pub fn quote(&self, enrollment: &PricedEnrollment, today: NaiveDate) -> ProrationResult {
        prorate(&ProrationInput {
            requested_start_date: enrollment.request.requested_start_date,
            today,
            full_monthly_dues: enrollment.monthly_dues,
            tax_rate: enrollment.tax_rate,
            initiation_fee: self.config.initiation_fee,
            service_addons: &enrollment.request.service_addons,
            child_addons: &enrollment.request.child_addons,
            pt_package_price: enrollment.pt_package.as_ref().map(|p| p.price),
        })
    }

    /// Run the workflow against the local clock.
    pub async fn run(
        &self,
        enrollment: &PricedEnrollment,
    ) -> Result<EnrollmentOutcome, EnrollmentError> {
        let now = Utc::now();
        let today = now.with_timezone(&Local).date_naive();
        self.run_at(enrollment, today, now).await
    }

    /// Run the workflow with an explicit business date and timestamp.
    pub async fn run_at(
        &self,
        enrollment: &PricedEnrollment,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<EnrollmentOutcome, EnrollmentError> {
        let tenant = &enrollment.tenant;
        let invoker = self.invoker.as_ref();
        let proration = self.quote(enrollment, today);
        let join_date = proration.effective_date.unwrap_or(today);

        transition(WorkflowState::Allocating, tenant, None);
        let allocation = CustomerCodeAllocator::new(invoker, tenant)
            .allocate(enrollment, join_date)
            .await
            .inspect_err(|e| {
                tracing::error!(tenant = %tenant, error = %e, "Enrollment aborted during allocation");
            })?;

        let customer_code = match allocation {
            Allocation::Allocated(code) => code,
            Allocation::FallbackRecorded(customer_code) => {
                transition(WorkflowState::FallbackReturned, tenant, Some(&customer_code));
                self.publish(
                    EnrollmentEvent::new(EVENT_FALLBACK_RECORDED, tenant)
                        .with_customer(&customer_code)
                        .with_payload(json!({
                            "businessName": enrollment.business_name(),
                            "email": enrollment.request.primary.contact.email,
                        })),
                );
                return Ok(EnrollmentOutcome::FallbackRecorded { customer_code });
            }
        };

        let writer = MembershipWriter::new(invoker, tenant);

        transition(WorkflowState::WritingMembership, tenant, Some(&customer_code));
        if let Err(e) = writer
            .insert_membership(enrollment, &customer_code, join_date)
            .await
        {
            return Err(self.abort(tenant, &customer_code, e, false).await);
        }

        if let Err(e) = self
            .write_records(&writer, enrollment, &customer_code, join_date, &proration)
            .await
        {
            return Err(self.abort(tenant, &customer_code, e, true).await);
        }

        transition(WorkflowState::WritingReceipts, tenant, Some(&customer_code));
        let lines = receipt_lines(
            enrollment,
            &customer_code,
            &self.config.prorated_dues_upc,
            first_of_next_month(join_date),
        );
        let receipts = ReceiptWriter::new(invoker, tenant).write(&lines).await;

        transition(WorkflowState::MigratingProduction, tenant, Some(&customer_code));
        let migration = ProductionMigrator::new(invoker, tenant, &self.config.prorated_dues_upc)
            .migrate(enrollment, &customer_code, &proration, join_date, now)
            .await;
        let customer_code = migration.final_customer_code(&customer_code);

        transition(WorkflowState::ArchivingContract, tenant, Some(&customer_code));
        let contract_path = match &enrollment.request.contract_document {
            Some(document) if !document.is_empty() => {
                let primary = &enrollment.request.primary;
                archive_contract(
                    self.contracts.as_ref(),
                    document,
                    today,
                    &customer_code,
                    &primary.first_name,
                    &primary.last_name,
                )
                .await
            }
            _ => None,
        };

        transition(WorkflowState::Responding, tenant, Some(&customer_code));
        let receipt = EnrollmentReceipt {
            customer_code,
            amount_billed: proration.total_due_now,
            migration,
            proration,
            receipts,
            contract_path,
        };
        self.announce(enrollment, &receipt);

        tracing::info!(
            tenant = %tenant,
            customer_code = %receipt.customer_code,
            transaction_id = %receipt.migration.transaction_id,
            result_code = receipt.migration.result_code,
            amount_billed = %receipt.amount_billed,
            "Enrollment completed"
        );
        Ok(EnrollmentOutcome::Completed(Box::new(receipt)))
    }

    /// Steps after the membership row: members, guardian, message, contract.
    async fn write_records(
        &self,
        writer: &MembershipWriter<'_>,
        enrollment: &PricedEnrollment,
        customer_code: &CustomerCode,
        join_date: NaiveDate,
        proration: &ProrationResult,
    ) -> Result<(), EnrollmentError> {
        let tenant = &enrollment.tenant;
        writer
            .insert_primary_member(enrollment, customer_code)
            .await?;

        transition(WorkflowState::WritingFamily, tenant, Some(customer_code));
        writer
            .insert_family(&enrollment.request.family_members, customer_code)
            .await?;

        if let Some(guardian) = &enrollment.request.guardian {
            transition(WorkflowState::WritingGuardian, tenant, Some(customer_code));
            writer.insert_guardian(guardian, customer_code).await?;
        }

        transition(WorkflowState::WritingMessageAndContract, tenant, Some(customer_code));
        writer
            .insert_join_message(enrollment, customer_code, join_date)
            .await;
        writer
            .insert_contract(enrollment, customer_code, join_date, proration)
            .await
    }

    /// Log, compensate when staged rows exist, and hand back the error.
    async fn abort(
        &self,
        tenant: &TenantId,
        customer_code: &CustomerCode,
        error: EnrollmentError,
        membership_written: bool,
    ) -> EnrollmentError {
        transition(WorkflowState::Aborted, tenant, Some(customer_code));
        tracing::error!(tenant = %tenant, customer_code = %customer_code, error = %error, "Enrollment aborted");

        let compensated = membership_written && self.config.compensate_on_abort;
        if compensated {
            self.compensate(tenant, customer_code).await;
        }

        self.publish(
            EnrollmentEvent::new(EVENT_ENROLLMENT_ABORTED, tenant)
                .with_customer(customer_code)
                .with_payload(json!({
                    "error": error.to_string(),
                    "compensated": compensated,
                })),
        );
        error
    }

    async fn compensate(&self, tenant: &TenantId, customer_code: &CustomerCode) {
        let params = [ProcParam::from(customer_code.as_str())];
        match self
            .invoker
            .invoke(tenant, Procedure::PurgeStagedEnrollment, &params)
            .await
        {
            Ok(_) => {
                tracing::info!(tenant = %tenant, customer_code = %customer_code, "Staged enrollment purged");
            }
            Err(e) => {
                tracing::warn!(
                    tenant = %tenant,
                    customer_code = %customer_code,
                    error = %e,
                    "Compensating purge failed; staged rows remain"
                );
            }
        }
    }

    fn announce(&self, enrollment: &PricedEnrollment, receipt: &EnrollmentReceipt) {
        let tenant = &enrollment.tenant;
        let primary = &enrollment.request.primary;

        self.publish(
            EnrollmentEvent::new(EVENT_ENROLLMENT_COMPLETED, tenant)
                .with_customer(&receipt.customer_code)
                .with_payload(json!({
                    "email": primary.contact.email,
                    "name": primary.first_name,
                    "amountBilled": format_money(receipt.amount_billed),
                    "transactionId": receipt.migration.transaction_id,
                })),
        );

        if receipt.needs_reconciliation() {
            self.publish(
                EnrollmentEvent::new(EVENT_RECONCILIATION_REQUIRED, tenant)
                    .with_customer(&receipt.customer_code)
                    .with_payload(json!({
                        "transactionId": receipt.migration.transaction_id,
                        "resultCode": receipt.migration.result_code,
                        "errorMessage": receipt.migration.error_message,
                    })),
            );
        }
    }

    fn publish(&self, event: EnrollmentEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}

fn transition(state: WorkflowState, tenant: &TenantId, customer_code: Option<&CustomerCode>) {
    tracing::debug!(
        %state,
        tenant = %tenant,
        customer_code = customer_code.map(CustomerCode::as_str).unwrap_or(""),
        "Enrollment state"
    );
}
