//! sqlx implementation of [`ProcedureInvoker`].
//!
//! Call text is built only from an allowlisted procedure name and `$n`
//! placeholders; every argument is bound by the driver.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row, TypeInfo, ValueRef};

use clubjoin_core::catalog::ProcedureCatalog;
use clubjoin_core::procedure::{
    ProcParam, ProcRow, ProcValue, Procedure, ProcedureError, ProcedureInvoker, Statement,
};
use clubjoin_core::types::TenantId;

use crate::TenantPools;

/// Executes legacy procedures through per-tenant PostgreSQL pools.
pub struct PgProcedureInvoker {
    pools: TenantPools,
    catalog: ProcedureCatalog,
}

impl PgProcedureInvoker {
    pub fn new(pools: TenantPools, catalog: ProcedureCatalog) -> Self {
        Self { pools, catalog }
    }

    async fn run(
        &self,
        tenant: &TenantId,
        label: &str,
        sql: &str,
        params: &[ProcParam],
    ) -> Result<Vec<ProcRow>, ProcedureError> {
        let pool = self.pools.pool(tenant);

        // One connection per call, returned to the pool on drop.
        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| ProcedureError::new(label, tenant, e))?;

        let query = params
            .iter()
            .fold(sqlx::query(sql), |query, param| bind_param(query, param));

        let rows = query
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| ProcedureError::new(label, tenant, e))?;

        tracing::debug!(
            procedure = label,
            tenant = %tenant,
            params = params.len(),
            rows = rows.len(),
            "Procedure call completed"
        );

        rows.iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ProcedureError::new(label, tenant, e))
    }
}

#[async_trait]
impl ProcedureInvoker for PgProcedureInvoker {
    async fn invoke(
        &self,
        tenant: &TenantId,
        procedure: Procedure,
        params: &[ProcParam],
    ) -> Result<Vec<ProcRow>, ProcedureError> {
        let name = self.catalog.name(procedure);
        let sql = call_text(name, params.len());
        self.run(tenant, name, &sql, params).await
    }

    async fn query(
        &self,
        tenant: &TenantId,
        statement: Statement,
        params: &[ProcParam],
    ) -> Result<Vec<ProcRow>, ProcedureError> {
        let label = statement.to_string();
        self.run(tenant, &label, statement_text(statement), params)
            .await
    }

    async fn health_check(&self, tenant: &TenantId) -> Result<(), ProcedureError> {
        crate::health_check(self.pools.pool(tenant))
            .await
            .map_err(|e| ProcedureError::new("health_check", tenant, e))
    }
}

// ---------------------------------------------------------------------------
// Call text
// ---------------------------------------------------------------------------

/// `SELECT * FROM name($1, $2, ...)` for `arity` arguments.
pub fn call_text(name: &str, arity: usize) -> String {
    let placeholders = (1..=arity)
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT * FROM {name}({placeholders})")
}

/// SQL for the fixed statements.
pub fn statement_text(statement: Statement) -> &'static str {
    match statement {
        Statement::MaxCustomerCode => {
            "SELECT MAX(customer_code) AS customer_code
             FROM memberships
             WHERE business_name = $1 AND email = $2"
        }
    }
}

fn bind_param<'q>(
    query: Query<'q, Postgres, PgArguments>,
    param: &'q ProcParam,
) -> Query<'q, Postgres, PgArguments> {
    match param {
        ProcParam::Text(s) => query.bind(s.as_str()),
        ProcParam::Int(i) => query.bind(*i),
        ProcParam::Decimal(d) => query.bind(*d),
        ProcParam::Bool(b) => query.bind(*b),
        ProcParam::Date(d) => query.bind(*d),
        ProcParam::Null => query.bind(None::<String>),
    }
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

/// How a result column is read, chosen from its Postgres type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int2,
    Int4,
    Int8,
    Numeric,
    Float4,
    Float8,
    Bool,
    Date,
    Timestamp,
    TimestampTz,
    Text,
    /// `SELECT * FROM f()` on a `void` function yields one `VOID` column.
    Void,
    /// Anything else (uuid, json, arrays, ...).
    Other,
}

fn column_kind(type_name: &str) -> ColumnKind {
    match type_name.to_ascii_uppercase().as_str() {
        "INT2" => ColumnKind::Int2,
        "INT4" => ColumnKind::Int4,
        "INT8" => ColumnKind::Int8,
        "NUMERIC" => ColumnKind::Numeric,
        "FLOAT4" => ColumnKind::Float4,
        "FLOAT8" => ColumnKind::Float8,
        "BOOL" => ColumnKind::Bool,
        "DATE" => ColumnKind::Date,
        "TIMESTAMP" => ColumnKind::Timestamp,
        "TIMESTAMPTZ" => ColumnKind::TimestampTz,
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "UNKNOWN" | "CITEXT" => ColumnKind::Text,
        "VOID" => ColumnKind::Void,
        _ => ColumnKind::Other,
    }
}

/// Convert a driver row into an ordered [`ProcRow`].
fn decode_row(row: &PgRow) -> Result<ProcRow, sqlx::Error> {
    let mut columns = Vec::with_capacity(row.columns().len());
    for (i, column) in row.columns().iter().enumerate() {
        let value = if row.try_get_raw(i)?.is_null() {
            ProcValue::Null
        } else {
            decode_value(row, i, column.type_info().name())?
        };
        columns.push((column.name().to_string(), value));
    }
    Ok(ProcRow::new(columns))
}

fn decode_value(row: &PgRow, i: usize, type_name: &str) -> Result<ProcValue, sqlx::Error> {
    let value = match column_kind(type_name) {
        ColumnKind::Int2 => ProcValue::Int(i64::from(row.try_get::<i16, _>(i)?)),
        ColumnKind::Int4 => ProcValue::Int(i64::from(row.try_get::<i32, _>(i)?)),
        ColumnKind::Int8 => ProcValue::Int(row.try_get::<i64, _>(i)?),
        ColumnKind::Numeric => ProcValue::Decimal(row.try_get::<Decimal, _>(i)?),
        ColumnKind::Float4 => ProcValue::Float(f64::from(row.try_get::<f32, _>(i)?)),
        ColumnKind::Float8 => ProcValue::Float(row.try_get::<f64, _>(i)?),
        ColumnKind::Bool => ProcValue::Bool(row.try_get::<bool, _>(i)?),
        ColumnKind::Date => ProcValue::Text(row.try_get::<NaiveDate, _>(i)?.to_string()),
        ColumnKind::Timestamp => ProcValue::Text(row.try_get::<NaiveDateTime, _>(i)?.to_string()),
        ColumnKind::TimestampTz => {
            ProcValue::Text(row.try_get::<DateTime<Utc>, _>(i)?.to_rfc3339())
        }
        ColumnKind::Text => ProcValue::Text(row.try_get::<String, _>(i)?),
        ColumnKind::Void => ProcValue::Null,
        // Readable as UTF-8 text or dropped; one odd column never fails the call.
        ColumnKind::Other => match row.try_get_unchecked::<String, _>(i) {
            Ok(text) => ProcValue::Text(text),
            Err(e) => {
                tracing::debug!(column = i, type_name, error = %e, "Column decoded as null");
                ProcValue::Null
            }
        },
    };
    Ok(value)
}
