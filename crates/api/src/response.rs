//! Response bodies for API handlers.

use rust_decimal::Decimal;
use serde::Serialize;

use clubjoin_pipeline::EnrollmentOutcome;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// Body returned for a finished enrollment.
///
/// A non-zero `resultCode` means the member is enrolled but the production
/// mirror needs manual reconciliation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentResponse {
    pub success: bool,
    pub message: String,
    pub cust_code: String,
    pub transaction_id: String,
    pub result_code: i64,
    pub error_message: Option<String>,
    pub amount_billed: Decimal,
}

/// Body returned when the customer code came from the fallback path.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackResponse {
    pub success: bool,
    pub message: String,
    pub cust_code: String,
    pub fallback: bool,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SubmitResponse {
    Completed(EnrollmentResponse),
    Fallback(FallbackResponse),
}

impl From<EnrollmentOutcome> for SubmitResponse {
    fn from(outcome: EnrollmentOutcome) -> Self {
        match outcome {
            EnrollmentOutcome::Completed(receipt) => {
                let receipt = *receipt;
                let message = if receipt.needs_reconciliation() {
                    "Enrollment completed; production record pending"
                } else {
                    "Enrollment completed"
                };
                Self::Completed(EnrollmentResponse {
                    success: true,
                    message: message.to_string(),
                    cust_code: receipt.customer_code.to_string(),
                    transaction_id: receipt.migration.transaction_id,
                    result_code: receipt.migration.result_code,
                    error_message: receipt.migration.error_message,
                    amount_billed: receipt.amount_billed,
                })
            }
            EnrollmentOutcome::FallbackRecorded { customer_code } => {
                Self::Fallback(FallbackResponse {
                    success: true,
                    message: "Membership recorded; enrollment will be completed by staff"
                        .to_string(),
                    cust_code: customer_code.to_string(),
                    fallback: true,
                })
            }
        }
    }
}
