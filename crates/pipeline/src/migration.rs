//! Production mirror.
//!
//! A single finalize call copies the staged rows into the production table
//! set. The call is allowed to fail: staging already holds the enrollment,
//! so a failed call degrades to a synthetic result that flags the
//! enrollment for manual reconciliation.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use clubjoin_core::procedure::{DecodeError, ProcParam, ProcRow, Procedure, ProcedureInvoker};
use clubjoin_core::proration::{addon_prorated_price, gross_monthly_dues, ProrationResult};
use clubjoin_core::types::{round2, CustomerCode, TenantId};

use crate::orchestrator::PricedEnrollment;

/// Caller-facing messages for a failed finalize. Details go to the log.
const FINALIZE_FAILED: &str = "Production finalize call failed";
const FINALIZE_UNREADABLE: &str = "Production finalize returned an unreadable result";

/// Result code meaning the finalize call itself did not complete.
pub const CALL_FAILED_RESULT_CODE: i64 = -1;

const TEMP_TRANSACTION_PREFIX: &str = "TEMP_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductionMigrationResult {
    /// 0 on success.
    pub result_code: i64,
    pub sql_error: Option<i64>,
    pub isam_error: Option<i64>,
    pub error_message: Option<String>,
    pub updated_customer_code: Option<String>,
    pub transaction_id: String,
}

impl ProductionMigrationResult {
    pub fn succeeded(&self) -> bool {
        self.result_code == 0
    }

    /// Stand-in used when the finalize call errors.
    pub fn call_failed(message: String, now: DateTime<Utc>) -> Self {
        Self {
            result_code: CALL_FAILED_RESULT_CODE,
            sql_error: None,
            isam_error: None,
            error_message: Some(message),
            updated_customer_code: None,
            transaction_id: synthetic_transaction_id(now),
        }
    }

    /// The code production knows the member by.
    pub fn final_customer_code(&self, staged: &CustomerCode) -> CustomerCode {
        self.updated_customer_code
            .as_deref()
            .and_then(|code| CustomerCode::new(code).ok())
            .unwrap_or_else(|| staged.clone())
    }
}

/// `"TEMP_<unix millis>"`.
pub fn synthetic_transaction_id(now: DateTime<Utc>) -> String {
    format!("{TEMP_TRANSACTION_PREFIX}{}", now.timestamp_millis())
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode the finalize row.
///
/// Columns are `(result_code, sql_error, isam_error, error_message,
/// customer_code, transaction_id)`, reachable by name, by numbered key
/// `"1"`..`"6"`, or by position. A blank transaction id falls back to any
/// column whose name contains `"tran"`, then to a synthetic id.
pub fn decode_finalize(
    rows: &[ProcRow],
    now: DateTime<Utc>,
) -> Result<ProductionMigrationResult, DecodeError> {
    let row = rows
        .first()
        .ok_or_else(|| DecodeError::NoRows(Procedure::FinalizeProduction.to_string()))?;

    let code_value = row.field("result_code", 1)?;
    let result_code = code_value.as_i64().ok_or_else(|| DecodeError::UnexpectedValue {
        name: "result_code",
        value: code_value.clone(),
    })?;

    let sql_error = row.field("sql_error", 2)?.as_i64();
    let isam_error = row.field("isam_error", 3)?.as_i64();
    let error_message = row.field("error_message", 4)?.as_text();
    let updated_customer_code = row.field("customer_code", 5)?.as_text();

    let transaction_id = row
        .field("transaction_id", 6)
        .ok()
        .and_then(|v| v.as_text())
        .or_else(|| scan_transaction_id(row))
        .unwrap_or_else(|| synthetic_transaction_id(now));

    Ok(ProductionMigrationResult {
        result_code,
        sql_error,
        isam_error,
        error_message,
        updated_customer_code,
        transaction_id,
    })
}

fn scan_transaction_id(row: &ProcRow) -> Option<String> {
    row.columns()
        .filter(|(name, _)| name.to_ascii_lowercase().contains("tran"))
        .find_map(|(_, value)| value.as_text())
}

// ---------------------------------------------------------------------------
// ProductionMigrator
// ---------------------------------------------------------------------------

/// One item-level line written after a successful finalize.
#[derive(Debug, Clone, PartialEq)]
pub struct UpcItem {
    pub upc: String,
    pub description: String,
    pub price: Decimal,
    pub tax: Decimal,
}

/// Dues at the configured UPC, each add-on at its dues-proportional
/// prorated price, and the PT package at full price with no tax.
pub fn upc_items(
    enrollment: &PricedEnrollment,
    proration: &ProrationResult,
    dues_upc: &str,
) -> Vec<UpcItem> {
    let mut items = vec![UpcItem {
        upc: dues_upc.to_string(),
        description: "PRORATED DUES".to_string(),
        price: proration.prorated_dues,
        tax: proration.prorated_dues_tax,
    }];

    for addon in enrollment.all_addons() {
        let price = addon_prorated_price(
            addon.monthly_price,
            proration.prorated_dues,
            enrollment.monthly_dues,
        );
        items.push(UpcItem {
            upc: addon.upc.clone(),
            description: addon.description.to_uppercase(),
            price,
            tax: round2(price * enrollment.tax_rate),
        });
    }

    if let Some(pt) = &enrollment.pt_package {
        items.push(UpcItem {
            upc: pt.upc.clone(),
            description: pt.description.to_uppercase(),
            price: pt.price,
            tax: Decimal::ZERO,
        });
    }

    items
}

pub struct ProductionMigrator<'a> {
    invoker: &'a dyn ProcedureInvoker,
    tenant: &'a TenantId,
    dues_upc: &'a str,
}

impl<'a> ProductionMigrator<'a> {
    pub fn new(invoker: &'a dyn ProcedureInvoker, tenant: &'a TenantId, dues_upc: &'a str) -> Self {
        Self {
            invoker,
            tenant,
            dues_upc,
        }
    }

    /// Run finalize and, on success, the UPC item writes. Never fails.
    pub async fn migrate(
        &self,
        enrollment: &PricedEnrollment,
        customer_code: &CustomerCode,
        proration: &ProrationResult,
        join_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> ProductionMigrationResult {
        let params = finalize_params(enrollment, customer_code, proration, join_date, now);

        let result = match self
            .invoker
            .invoke(self.tenant, Procedure::FinalizeProduction, &params)
            .await
        {
            Ok(rows) => decode_finalize(&rows, now).unwrap_or_else(|e| {
                tracing::warn!(customer_code = %customer_code, error = %e, "Finalize result undecodable");
                ProductionMigrationResult::call_failed(FINALIZE_UNREADABLE.to_string(), now)
            }),
            Err(e) => {
                tracing::warn!(customer_code = %customer_code, error = %e, "Finalize call failed");
                ProductionMigrationResult::call_failed(FINALIZE_FAILED.to_string(), now)
            }
        };

        if result.succeeded() {
            let code = result.final_customer_code(customer_code);
            self.write_upc_items(enrollment, &code, proration, &result.transaction_id)
                .await;
        } else {
            tracing::warn!(
                customer_code = %customer_code,
                result_code = result.result_code,
                transaction_id = %result.transaction_id,
                error_message = result.error_message.as_deref().unwrap_or(""),
                "Production mirror not confirmed"
            );
        }

        result
    }

    async fn write_upc_items(
        &self,
        enrollment: &PricedEnrollment,
        customer_code: &CustomerCode,
        proration: &ProrationResult,
        transaction_id: &str,
    ) {
        for item in upc_items(enrollment, proration, self.dues_upc) {
            let params: Vec<ProcParam> = vec![
                customer_code.as_str().into(),
                transaction_id.into(),
                item.upc.as_str().into(),
                item.description.as_str().into(),
                ProcParam::money(item.price),
                ProcParam::money(item.tax),
            ];
            if let Err(e) = self
                .invoker
                .invoke(self.tenant, Procedure::InsertUpcItem, &params)
                .await
            {
                tracing::warn!(
                    customer_code = %customer_code,
                    upc = %item.upc,
                    error = %e,
                    "UPC item write failed, skipping"
                );
            }
        }
    }
}

fn finalize_params(
    enrollment: &PricedEnrollment,
    customer_code: &CustomerCode,
    proration: &ProrationResult,
    join_date: NaiveDate,
    now: DateTime<Utc>,
) -> Vec<ProcParam> {
    let request = &enrollment.request;
    let payment = &request.payment;
    let gross = gross_monthly_dues(enrollment.monthly_dues, enrollment.all_addons());
    let pt = enrollment.pt_package.as_ref();

    vec![
        customer_code.as_str().into(),
        request.club.as_str().into(),
        join_date.into(),
        now.date_naive().into(),
        enrollment.business_name().into(),
        enrollment.category.as_str().into(),
        request.specialty.code().into(),
        ProcParam::money(gross),
        ProcParam::money(enrollment.monthly_dues),
        ProcParam::money(proration.prorated_dues),
        ProcParam::money(proration.prorated_dues_tax),
        ProcParam::money(proration.prorated_addons_total),
        ProcParam::money(proration.prorated_addons_tax),
        ProcParam::money(proration.full_monthly_tax),
        ProcParam::money(proration.initiation_fee),
        ProcParam::money(proration.total_due_now),
        enrollment.tax_rate.into(),
        payment.card_type.as_str().into(),
        payment.last_four.as_str().into(),
        payment.expiry().into(),
        payment.name_on_card.as_str().into(),
        payment.authorization_code.clone().into(),
        ProcParam::flag(pt.is_some()),
        pt.map(|p| p.upc.as_str()).into(),
        ProcParam::money(proration.pt_package_price),
        (request.family_members.len() as i64).into(),
    ]
}
