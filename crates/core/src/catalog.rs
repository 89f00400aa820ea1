//! Resolution of logical procedures to their deployed names.
//!
//! Deployments of the legacy store do not agree on procedure names, so the
//! real name of each [`Procedure`] is found by scanning the
//! procedure-definition artifact shipped with the store (the DDL script)
//! for `CREATE PROCEDURE` / `CREATE FUNCTION` statements.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;
use crate::procedure::Procedure;

static DEFINITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*create\s+(?:or\s+replace\s+)?(?:procedure|function)\s+([A-Za-z_][A-Za-z0-9_.]*)")
        .expect("valid regex")
});

static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("valid regex")
});

/// Allowlist of procedure names the invoker may place in call text.
#[derive(Debug, Clone)]
pub struct ProcedureCatalog {
    names: HashMap<Procedure, String>,
}

impl ProcedureCatalog {
    /// Catalog using every procedure's default name.
    pub fn defaults() -> Self {
        let names = Procedure::ALL
            .iter()
            .map(|p| (*p, p.default_name().to_string()))
            .collect();
        Self { names }
    }

    /// Build a catalog from the text of a procedure-definition artifact.
    ///
    /// Each logical procedure binds to the first declared name matching its
    /// [`name_pattern`](Procedure::name_pattern); procedures with no match
    /// keep their default name.
    pub fn from_definitions(definitions: &str) -> Result<Self, CoreError> {
        let declared: Vec<&str> = DEFINITION_RE
            .captures_iter(definitions)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();

        let mut names = HashMap::with_capacity(Procedure::ALL.len());
        for procedure in Procedure::ALL {
            let pattern = Regex::new(procedure.name_pattern())
                .map_err(|e| CoreError::Internal(format!("Invalid name pattern: {e}")))?;
            let name = declared
                .iter()
                .find(|name| pattern.is_match(name))
                .map_or_else(|| procedure.default_name().to_string(), |n| n.to_string());
            validate_identifier(&name)?;
            names.insert(procedure, name);
        }

        Ok(Self { names })
    }

    /// Deployed name of `procedure`.
    pub fn name(&self, procedure: Procedure) -> &str {
        self.names
            .get(&procedure)
            .map_or_else(|| procedure.default_name(), String::as_str)
    }
}

impl Default for ProcedureCatalog {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Reject anything that is not a plain (optionally schema-qualified) identifier.
pub fn validate_identifier(name: &str) -> Result<(), CoreError> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "'{name}' is not a valid procedure identifier"
        )))
    }
}
