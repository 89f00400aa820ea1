//! Derived display strings written to the legacy store and the contract archive.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::enrollment::ContactInfo;
use crate::types::{format_money, CustomerCode};

/// Uppercased `"FIRST MI. LAST"`, or `"FIRST LAST"` without a middle initial.
pub fn business_name(first: &str, middle_initial: Option<&str>, last: &str) -> String {
    let initial = middle_initial
        .map(str::trim)
        .and_then(|mi| mi.chars().next());
    let name = match initial {
        Some(mi) => format!("{} {}. {}", first.trim(), mi, last.trim()),
        None => format!("{} {}", first.trim(), last.trim()),
    };
    name.to_uppercase()
}

/// Phone stored on the membership: cell, then home, then work.
pub fn preferred_phone(contact: &ContactInfo) -> Option<&str> {
    [&contact.cell_phone, &contact.home_phone, &contact.work_phone]
        .into_iter()
        .filter_map(|p| p.as_deref().map(str::trim))
        .find(|p| !p.is_empty())
}

/// Free-text join message: `"Join: MM/DD/YYYY Net: $49.99"`.
pub fn join_message(join_date: NaiveDate, monthly_dues: Decimal) -> String {
    format!(
        "Join: {} Net: ${}",
        join_date.format("%m/%d/%Y"),
        format_money(monthly_dues)
    )
}

/// Archive filename for a signed contract.
///
/// Convention: `"MM-DD-YYYY <customerCode> <firstName> <lastName> ONLINE.pdf"`.
/// Path separators in names are replaced so the file always lands in the
/// archive directory.
pub fn contract_filename(
    date: NaiveDate,
    customer_code: &CustomerCode,
    first_name: &str,
    last_name: &str,
) -> String {
    format!(
        "{} {} {} {} ONLINE.pdf",
        date.format("%m-%d-%Y"),
        customer_code,
        sanitize_component(first_name),
        sanitize_component(last_name)
    )
}

/// Receipt document number: customer code plus a 1-based line sequence.
pub fn receipt_document_number(customer_code: &CustomerCode, sequence: usize) -> String {
    format!("{customer_code}-{sequence:02}")
}

fn sanitize_component(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            other => other,
        })
        .collect()
}
