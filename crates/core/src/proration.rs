//! Prorated dues and tax for the first, partial billing month.
//!
//! Every intermediate figure is rounded to cents before it feeds the next
//! one. Rounding once at the end would drift from the amounts already on
//! file for existing members.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::enrollment::ServiceAddon;
use crate::types::round2;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Inputs to [`prorate`].
#[derive(Debug, Clone)]
pub struct ProrationInput<'a> {
    /// Requested start; `None` when the form left it blank.
    pub requested_start_date: Option<NaiveDate>,
    pub today: NaiveDate,
    pub full_monthly_dues: Decimal,
    /// Zero for non-taxed jurisdictions.
    pub tax_rate: Decimal,
    pub initiation_fee: Decimal,
    pub service_addons: &'a [ServiceAddon],
    pub child_addons: &'a [ServiceAddon],
    /// Charged in full today when a personal-training package is selected.
    pub pt_package_price: Option<Decimal>,
}

/// Amounts due now and per month for a new membership.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProrationResult {
    pub effective_date: Option<NaiveDate>,
    pub days_in_month: u32,
    pub days_remaining: u32,
    pub prorated_factor: Decimal,
    pub prorated_dues: Decimal,
    pub prorated_dues_tax: Decimal,
    pub prorated_addons_total: Decimal,
    pub prorated_addons_tax: Decimal,
    pub full_monthly_dues: Decimal,
    pub full_monthly_tax: Decimal,
    pub initiation_fee: Decimal,
    pub pt_package_price: Decimal,
    pub total_due_now: Decimal,
}

// ---------------------------------------------------------------------------
// Calendar helpers
// ---------------------------------------------------------------------------

/// Number of days in the month containing `date`.
pub fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first_of_next| first_of_next.pred_opt())
        .map_or(31, |last| last.day())
}

/// First day of the month after `date`. Recurring billing begins here.
pub fn first_of_next_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Compute prorated dues, add-ons, and tax.
///
/// The initiation fee is folded into the dues tax base, never into the
/// add-on tax base. A blank start date yields zero for every prorated
/// figure; the initiation fee and any PT package are still due.
pub fn prorate(input: &ProrationInput<'_>) -> ProrationResult {
    let full_monthly_tax = round2(input.full_monthly_dues * input.tax_rate);
    let pt_package_price = input.pt_package_price.map(round2).unwrap_or_default();

    let Some(start) = input.requested_start_date else {
        return ProrationResult {
            effective_date: None,
            days_in_month: 0,
            days_remaining: 0,
            prorated_factor: Decimal::ZERO,
            prorated_dues: Decimal::ZERO,
            prorated_dues_tax: Decimal::ZERO,
            prorated_addons_total: Decimal::ZERO,
            prorated_addons_tax: Decimal::ZERO,
            full_monthly_dues: input.full_monthly_dues,
            full_monthly_tax,
            initiation_fee: input.initiation_fee,
            pt_package_price,
            total_due_now: round2(input.initiation_fee + pt_package_price),
        };
    };

    let effective = start.max(input.today);
    let days_in_month = days_in_month(effective);
    let days_remaining = days_in_month - effective.day() + 1;
    let factor = Decimal::from(days_remaining) / Decimal::from(days_in_month);

    let prorated_dues = round2(input.full_monthly_dues * factor);
    let prorated_addons_total = round2(
        input
            .service_addons
            .iter()
            .chain(input.child_addons)
            .map(|addon| addon.monthly_price * factor)
            .sum::<Decimal>(),
    );
    let prorated_dues_tax = round2((input.initiation_fee + prorated_dues) * input.tax_rate);
    let prorated_addons_tax = round2(prorated_addons_total * input.tax_rate);

    let total_due_now = round2(
        input.initiation_fee
            + prorated_dues
            + prorated_addons_total
            + prorated_dues_tax
            + prorated_addons_tax
            + pt_package_price,
    );

    ProrationResult {
        effective_date: Some(effective),
        days_in_month,
        days_remaining,
        prorated_factor: factor,
        prorated_dues,
        prorated_dues_tax,
        prorated_addons_total,
        prorated_addons_tax,
        full_monthly_dues: input.full_monthly_dues,
        full_monthly_tax,
        initiation_fee: input.initiation_fee,
        pt_package_price,
        total_due_now,
    }
}

/// Monthly dues plus every add-on price. Recorded as gross on the contract.
pub fn gross_monthly_dues<'a>(
    net_dues: Decimal,
    addons: impl IntoIterator<Item = &'a ServiceAddon>,
) -> Decimal {
    round2(net_dues + addons.into_iter().map(|a| a.monthly_price).sum::<Decimal>())
}

/// Prorate an add-on by the same ratio the dues were prorated by.
///
/// Returns zero when the full dues are zero.
pub fn addon_prorated_price(
    addon_price: Decimal,
    prorated_dues: Decimal,
    full_net_dues: Decimal,
) -> Decimal {
    if full_net_dues.is_zero() {
        return Decimal::ZERO;
    }
    round2(addon_price * (prorated_dues / full_net_dues))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
