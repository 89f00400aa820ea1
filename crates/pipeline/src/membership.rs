//! Membership, member, guardian, join message and contract rows.
//!
//! Every insert is its own remote call. Membership, member, guardian and
//! contract failures abort the enrollment; the join message is auxiliary
//! and only logged.

use chrono::NaiveDate;

use clubjoin_core::enrollment::{FamilyMember, Guardian, MemberRole, MemberType};
use clubjoin_core::naming::{join_message, preferred_phone};
use clubjoin_core::procedure::{ProcParam, Procedure, ProcedureInvoker};
use clubjoin_core::proration::{gross_monthly_dues, ProrationResult};
use clubjoin_core::types::{CustomerCode, TenantId};

use crate::error::{EnrollmentError, WriteStep};
use crate::orchestrator::PricedEnrollment;

/// Member code of the primary applicant.
pub const PRIMARY_MEMBER_CODE: u32 = 0;

/// Member code given to a junior membership's guardian.
pub const GUARDIAN_MEMBER_CODE: u32 = 1;

// ---------------------------------------------------------------------------
// Member code assignment
// ---------------------------------------------------------------------------

/// A family member with its assigned code and role.
#[derive(Debug, Clone, Copy)]
pub struct MemberSlot<'a> {
    pub member_code: u32,
    pub role: MemberRole,
    pub member: &'a FamilyMember,
}

/// Adults first, then dependents, each group in input order, numbered
/// from 1 with a single counter.
pub fn assign_member_codes(family: &[FamilyMember]) -> Vec<MemberSlot<'_>> {
    let adults = family.iter().filter(|m| m.member_type == MemberType::Adult);
    let dependents = family.iter().filter(|m| m.member_type != MemberType::Adult);

    adults
        .chain(dependents)
        .zip(PRIMARY_MEMBER_CODE + 1..)
        .map(|(member, member_code)| MemberSlot {
            member_code,
            role: member.role(),
            member,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Parameter lists
// ---------------------------------------------------------------------------

/// Arguments for the membership insert.
///
/// The allocator's fallback path passes a blank `customer_code`; the bridge
/// code always mirrors the customer code.
pub fn membership_params(
    enrollment: &PricedEnrollment,
    customer_code: &str,
    join_date: NaiveDate,
) -> Vec<ProcParam> {
    let request = &enrollment.request;
    let primary = &request.primary;
    let payment = &request.payment;

    vec![
        customer_code.into(),
        customer_code.into(),
        request.club.as_str().into(),
        enrollment.business_name().into(),
        primary.first_name.as_str().into(),
        primary.middle_initial.clone().into(),
        primary.last_name.as_str().into(),
        primary.address.line1.as_str().into(),
        primary.address.line2.clone().into(),
        primary.address.city.as_str().into(),
        primary.address.state.as_str().into(),
        primary.address.zip.as_str().into(),
        preferred_phone(&primary.contact).into(),
        primary.contact.email.as_str().into(),
        primary.date_of_birth.into(),
        primary.gender.as_str().into(),
        join_date.into(),
        enrollment.category.as_str().into(),
        request.specialty.code().into(),
        payment.card_type.as_str().into(),
        payment.last_four.as_str().into(),
        payment.expiry().into(),
        payment.name_on_card.as_str().into(),
        ProcParam::flag(enrollment.pt_package.is_some()),
    ]
}

fn member_params(
    customer_code: &CustomerCode,
    member_code: u32,
    role: MemberRole,
    member: &FamilyMember,
) -> Vec<ProcParam> {
    vec![
        customer_code.as_str().into(),
        member_code.into(),
        role.code().into(),
        member.first_name.as_str().into(),
        member.middle_initial.clone().into(),
        member.last_name.as_str().into(),
        member.date_of_birth.into(),
        member.gender.as_str().into(),
        member.email.clone().into(),
        member.cell_phone.clone().into(),
        member.member_type.as_str().into(),
    ]
}

fn primary_member_params(enrollment: &PricedEnrollment, customer_code: &CustomerCode) -> Vec<ProcParam> {
    let primary = &enrollment.request.primary;
    vec![
        customer_code.as_str().into(),
        PRIMARY_MEMBER_CODE.into(),
        MemberRole::Primary.code().into(),
        primary.first_name.as_str().into(),
        primary.middle_initial.clone().into(),
        primary.last_name.as_str().into(),
        primary.date_of_birth.into(),
        primary.gender.as_str().into(),
        primary.contact.email.as_str().into(),
        preferred_phone(&primary.contact).into(),
        MemberType::Adult.as_str().into(),
    ]
}

fn guardian_params(customer_code: &CustomerCode, guardian: &Guardian) -> Vec<ProcParam> {
    vec![
        customer_code.as_str().into(),
        GUARDIAN_MEMBER_CODE.into(),
        MemberRole::Guardian.code().into(),
        guardian.first_name.as_str().into(),
        ProcParam::Null,
        guardian.last_name.as_str().into(),
        guardian.date_of_birth.into(),
        guardian.gender.clone().into(),
        guardian.email.clone().into(),
        guardian.phone.clone().into(),
        guardian.relationship.clone().into(),
    ]
}

// ---------------------------------------------------------------------------
// MembershipWriter
// ---------------------------------------------------------------------------

/// Writes the membership record set for one customer code.
pub struct MembershipWriter<'a> {
    invoker: &'a dyn ProcedureInvoker,
    tenant: &'a TenantId,
}

impl<'a> MembershipWriter<'a> {
    pub fn new(invoker: &'a dyn ProcedureInvoker, tenant: &'a TenantId) -> Self {
        Self { invoker, tenant }
    }

    async fn call(
        &self,
        procedure: Procedure,
        params: &[ProcParam],
        step: WriteStep,
        customer_code: &CustomerCode,
    ) -> Result<(), EnrollmentError> {
        tracing::debug!(%step, customer_code = %customer_code, "Writing record");
        self.invoker
            .invoke(self.tenant, procedure, params)
            .await
            .map(|_| ())
            .map_err(|e| {
                tracing::error!(%step, customer_code = %customer_code, error = %e, "Record write failed");
                EnrollmentError::write(step)(e)
            })
    }

    pub async fn insert_membership(
        &self,
        enrollment: &PricedEnrollment,
        customer_code: &CustomerCode,
        join_date: NaiveDate,
    ) -> Result<(), EnrollmentError> {
        let params = membership_params(enrollment, customer_code.as_str(), join_date);
        self.call(Procedure::InsertMembership, &params, WriteStep::Membership, customer_code)
            .await
    }

    pub async fn insert_primary_member(
        &self,
        enrollment: &PricedEnrollment,
        customer_code: &CustomerCode,
    ) -> Result<(), EnrollmentError> {
        let params = primary_member_params(enrollment, customer_code);
        self.call(Procedure::InsertMember, &params, WriteStep::PrimaryMember, customer_code)
            .await
    }

    /// Insert every family member in code order. Returns the number written.
    pub async fn insert_family(
        &self,
        family: &[FamilyMember],
        customer_code: &CustomerCode,
    ) -> Result<usize, EnrollmentError> {
        let slots = assign_member_codes(family);
        for slot in &slots {
            let params = member_params(customer_code, slot.member_code, slot.role, slot.member);
            let step = WriteStep::FamilyMember {
                member_code: slot.member_code,
            };
            self.call(Procedure::InsertMember, &params, step, customer_code)
                .await?;
        }
        Ok(slots.len())
    }

    pub async fn insert_guardian(
        &self,
        guardian: &Guardian,
        customer_code: &CustomerCode,
    ) -> Result<(), EnrollmentError> {
        let params = guardian_params(customer_code, guardian);
        self.call(Procedure::InsertMember, &params, WriteStep::Guardian, customer_code)
            .await
    }

    /// Returns `false` when the message could not be written.
    pub async fn insert_join_message(
        &self,
        enrollment: &PricedEnrollment,
        customer_code: &CustomerCode,
        join_date: NaiveDate,
    ) -> bool {
        let params: Vec<ProcParam> = vec![
            customer_code.as_str().into(),
            join_message(join_date, enrollment.monthly_dues).into(),
            join_date.into(),
        ];
        match self
            .invoker
            .invoke(self.tenant, Procedure::InsertMessage, &params)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(
                    customer_code = %customer_code,
                    error = %e,
                    "Join message write failed, continuing"
                );
                false
            }
        }
    }

    /// Agreement record carrying gross (dues plus add-ons) and net dues.
    pub async fn insert_contract(
        &self,
        enrollment: &PricedEnrollment,
        customer_code: &CustomerCode,
        join_date: NaiveDate,
        proration: &ProrationResult,
    ) -> Result<(), EnrollmentError> {
        let gross = gross_monthly_dues(enrollment.monthly_dues, enrollment.all_addons());
        let params = vec![
            customer_code.as_str().into(),
            enrollment.request.club.as_str().into(),
            join_date.into(),
            ProcParam::money(gross),
            ProcParam::money(enrollment.monthly_dues),
            ProcParam::money(proration.initiation_fee),
            ProcParam::money(proration.total_due_now),
            enrollment.category.as_str().into(),
            enrollment.request.specialty.code().into(),
        ];
        self.call(Procedure::InsertContract, &params, WriteStep::Contract, customer_code)
            .await
    }
}
