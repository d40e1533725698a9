//! Identifier validation and quoting.
//!
//! Table and column names cannot be bound as statement parameters, so every
//! name that reaches generated SQL goes through [`quote`], which wraps it in
//! double quotes and doubles any embedded quote. Quoting also makes reserved
//! words such as `user` or `order` usable as column names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Redshift limit on identifier length, in bytes.
pub const MAX_IDENTIFIER_BYTES: usize = 127;

/// Reject names that cannot be quoted safely.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(BridgeError::InvalidTableDefinition(
            "identifier cannot be empty".to_string(),
        ));
    }
    if name.contains('\0') {
        return Err(BridgeError::InvalidTableDefinition(format!(
            "identifier contains a null byte: {:?}",
            name
        )));
    }
    if name.len() > MAX_IDENTIFIER_BYTES {
        return Err(BridgeError::InvalidTableDefinition(format!(
            "identifier exceeds {} bytes (got {}): {:?}",
            MAX_IDENTIFIER_BYTES,
            name.len(),
            name
        )));
    }
    Ok(())
}

/// Quote an identifier for the warehouse.
pub fn quote(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote and join a list of identifiers with `, `.
pub fn quote_list<S: AsRef<str>>(names: &[S]) -> Result<String> {
    Ok(names
        .iter()
        .map(|n| quote(n.as_ref()))
        .collect::<Result<Vec<_>>>()?
        .join(", "))
}

/// A table name with an optional schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QualifiedName {
    schema: Option<String>,
    table: String,
}

impl QualifiedName {
    pub fn new(schema: Option<&str>, table: &str) -> Result<Self> {
        if let Some(s) = schema {
            validate_identifier(s)?;
        }
        validate_identifier(table)?;
        Ok(Self {
            schema: schema.map(str::to_string),
            table: table.to_string(),
        })
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// `"schema"."table"` or `"table"`.
    pub fn quoted(&self) -> String {
        let table = format!("\"{}\"", self.table.replace('"', "\"\""));
        match &self.schema {
            Some(s) => format!("\"{}\".{}", s.replace('"', "\"\""), table),
            None => table,
        }
    }
}

impl FromStr for QualifiedName {
    type Err = BridgeError;

    /// Splits on the first `.`; a name with no dot has no schema.
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('.') {
            Some((schema, table)) => Self::new(Some(schema), table),
            None => Self::new(None, s),
        }
    }
}

impl TryFrom<String> for QualifiedName {
    type Error = BridgeError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<QualifiedName> for String {
    fn from(name: QualifiedName) -> Self {
        name.to_string()
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(s) => write!(f, "{}.{}", s, self.table),
            None => f.write_str(&self.table),
        }
    }
}
