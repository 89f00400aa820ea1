use std::fmt;

use clubjoin_core::error::CoreError;
use clubjoin_core::procedure::ProcedureError;

/// A fatal write inside the membership sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    Membership,
    PrimaryMember,
    FamilyMember { member_code: u32 },
    Guardian,
    Contract,
}

impl fmt::Display for WriteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Membership => f.write_str("membership"),
            Self::PrimaryMember => f.write_str("primary member"),
            Self::FamilyMember { member_code } => write!(f, "family member {member_code}"),
            Self::Guardian => f.write_str("guardian"),
            Self::Contract => f.write_str("contract"),
        }
    }
}

/// Errors that abort an enrollment.
#[derive(Debug, thiserror::Error)]
pub enum EnrollmentError {
    /// Neither allocation path produced a customer code.
    #[error("customer code allocation failed: {0}")]
    Allocation(String),

    #[error("{step} write failed: {source}")]
    MembershipWrite {
        step: WriteStep,
        #[source]
        source: ProcedureError,
    },

    #[error(transparent)]
    Procedure(#[from] ProcedureError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl EnrollmentError {
    pub(crate) fn write(step: WriteStep) -> impl FnOnce(ProcedureError) -> Self {
        move |source| Self::MembershipWrite { step, source }
    }
}
