//! Customer code allocation.
//!
//! The primary path asks the store for the next membership id. When that
//! yields nothing usable, the fallback inserts a membership row with a blank
//! code and reads back the generated code by business name and email. The
//! fallback row is the only record written for that request, so callers
//! receive [`Allocation::FallbackRecorded`] and must stop there.

use chrono::NaiveDate;

use clubjoin_core::procedure::{ProcParam, Procedure, ProcedureInvoker, Statement};
use clubjoin_core::types::{CustomerCode, TenantId};

use crate::error::EnrollmentError;
use crate::membership::membership_params;
use crate::orchestrator::PricedEnrollment;

/// How the customer code was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Allocation {
    /// Fresh code from the allocation procedure; nothing written yet.
    Allocated(CustomerCode),
    /// Code recovered after the fallback membership insert.
    FallbackRecorded(CustomerCode),
}

impl Allocation {
    pub fn customer_code(&self) -> &CustomerCode {
        match self {
            Self::Allocated(code) | Self::FallbackRecorded(code) => code,
        }
    }
}

pub struct CustomerCodeAllocator<'a> {
    invoker: &'a dyn ProcedureInvoker,
    tenant: &'a TenantId,
}

impl<'a> CustomerCodeAllocator<'a> {
    pub fn new(invoker: &'a dyn ProcedureInvoker, tenant: &'a TenantId) -> Self {
        Self { invoker, tenant }
    }

    pub async fn allocate(
        &self,
        enrollment: &PricedEnrollment,
        join_date: NaiveDate,
    ) -> Result<Allocation, EnrollmentError> {
        if let Some(code) = self.next_membership_id(&enrollment.request.club).await {
            tracing::info!(tenant = %self.tenant, customer_code = %code, "Customer code allocated");
            return Ok(Allocation::Allocated(code));
        }

        let code = self.fallback(enrollment, join_date).await?;
        tracing::warn!(
            tenant = %self.tenant,
            customer_code = %code,
            "Customer code recovered via fallback insert"
        );
        Ok(Allocation::FallbackRecorded(code))
    }

    /// First column of the first row, if non-blank.
    async fn next_membership_id(&self, club: &str) -> Option<CustomerCode> {
        let params = [ProcParam::from(club)];
        let rows = match self
            .invoker
            .invoke(self.tenant, Procedure::NextMembershipId, &params)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(tenant = %self.tenant, error = %e, "Next membership id call failed");
                return None;
            }
        };

        let code = rows
            .first()
            .and_then(|row| row.first_text())
            .and_then(|text| CustomerCode::new(text).ok());
        if code.is_none() {
            tracing::warn!(tenant = %self.tenant, "Next membership id returned no value");
        }
        code
    }

    async fn fallback(
        &self,
        enrollment: &PricedEnrollment,
        join_date: NaiveDate,
    ) -> Result<CustomerCode, EnrollmentError> {
        let params = membership_params(enrollment, "", join_date);
        self.invoker
            .invoke(self.tenant, Procedure::InsertMembership, &params)
            .await
            .map_err(|e| EnrollmentError::Allocation(format!("fallback membership insert failed: {e}")))?;

        let lookup: [ProcParam; 2] = [
            enrollment.business_name().into(),
            enrollment.request.primary.contact.email.as_str().into(),
        ];
        let rows = self
            .invoker
            .query(self.tenant, Statement::MaxCustomerCode, &lookup)
            .await
            .map_err(|e| EnrollmentError::Allocation(format!("customer code lookup failed: {e}")))?;

        rows.first()
            .and_then(|row| row.first_text())
            .and_then(|text| CustomerCode::new(text).ok())
            .ok_or_else(|| {
                EnrollmentError::Allocation("no customer code found after fallback insert".into())
            })
    }
}
