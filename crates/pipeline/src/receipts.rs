//! Receipt lines: one for the monthly dues, one per purchased add-on.
//!
//! Lines are written one call at a time. A failed line is logged and the
//! remaining lines are still attempted.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use clubjoin_core::naming::receipt_document_number;
use clubjoin_core::procedure::{ProcParam, Procedure, ProcedureInvoker};
use clubjoin_core::types::{CustomerCode, TenantId};

use crate::orchestrator::PricedEnrollment;

const DUES_STATEMENT_TEXT: &str = "MONTHLY DUES";

/// Billing flag stored on each receipt line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Billable {
    /// `'D'`: membership dues.
    Dues,
    /// `'B'`: billable add-on.
    Addon,
}

impl Billable {
    pub fn code(self) -> &'static str {
        match self {
            Self::Dues => "D",
            Self::Addon => "B",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptLine {
    pub document_number: String,
    pub bill_to: String,
    pub amount: Decimal,
    pub billable: Billable,
    pub upc_code: String,
    pub statement_text: String,
    pub begin_date: NaiveDate,
}

impl ReceiptLine {
    fn params(&self) -> Vec<ProcParam> {
        vec![
            self.document_number.as_str().into(),
            self.bill_to.as_str().into(),
            ProcParam::money(self.amount),
            self.billable.code().into(),
            self.upc_code.as_str().into(),
            self.statement_text.as_str().into(),
            self.begin_date.into(),
        ]
    }
}

/// Build the dues line followed by one line per service and child add-on.
pub fn receipt_lines(
    enrollment: &PricedEnrollment,
    customer_code: &CustomerCode,
    dues_upc: &str,
    begin_date: NaiveDate,
) -> Vec<ReceiptLine> {
    let dues = ReceiptLine {
        document_number: receipt_document_number(customer_code, 1),
        bill_to: customer_code.to_string(),
        amount: enrollment.monthly_dues,
        billable: Billable::Dues,
        upc_code: dues_upc.to_string(),
        statement_text: DUES_STATEMENT_TEXT.to_string(),
        begin_date,
    };

    let addons = enrollment
        .all_addons()
        .enumerate()
        .map(|(i, addon)| ReceiptLine {
            document_number: receipt_document_number(customer_code, i + 2),
            bill_to: customer_code.to_string(),
            amount: addon.monthly_price,
            billable: Billable::Addon,
            upc_code: addon.upc.clone(),
            statement_text: addon.description.to_uppercase(),
            begin_date,
        });

    std::iter::once(dues).chain(addons).collect()
}

/// Lines written and lines skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiptSummary {
    pub written: usize,
    pub failed: usize,
}

pub struct ReceiptWriter<'a> {
    invoker: &'a dyn ProcedureInvoker,
    tenant: &'a TenantId,
}

impl<'a> ReceiptWriter<'a> {
    pub fn new(invoker: &'a dyn ProcedureInvoker, tenant: &'a TenantId) -> Self {
        Self { invoker, tenant }
    }

    pub async fn write(&self, lines: &[ReceiptLine]) -> ReceiptSummary {
        let mut summary = ReceiptSummary::default();
        for line in lines {
            match self
                .invoker
                .invoke(self.tenant, Procedure::InsertReceipt, &line.params())
                .await
            {
                Ok(_) => summary.written += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(
                        document_number = %line.document_number,
                        upc = %line.upc_code,
                        error = %e,
                        "Receipt line write failed, skipping"
                    );
                }
            }
        }
        summary
    }
}
