//! Validated table definitions.

mod identifier;

pub use identifier::{quote, quote_list, validate_identifier, QualifiedName, MAX_IDENTIFIER_BYTES};

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// One column of a warehouse table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub warehouse_type: String,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_sort_key: bool,
    #[serde(default)]
    pub is_dist_key: bool,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// Literal default; numeric text is emitted bare, anything else quoted.
    #[serde(default)]
    pub default: Option<String>,
    /// `(seed, step)` for an IDENTITY column.
    #[serde(default)]
    pub identity: Option<(i64, i64)>,
    #[serde(default)]
    pub unique: bool,
    /// Referenced table, e.g. `other_table(id)`.
    #[serde(default)]
    pub references: Option<String>,
}

fn default_nullable() -> bool {
    true
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, warehouse_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            warehouse_type: warehouse_type.into(),
            is_primary_key: false,
            is_sort_key: false,
            is_dist_key: false,
            encoding: None,
            nullable: true,
            default: None,
            identity: None,
            unique: false,
            references: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    pub fn sort_key(mut self) -> Self {
        self.is_sort_key = true;
        self
    }

    pub fn dist_key(mut self) -> Self {
        self.is_dist_key = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn encode(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn identity(mut self, seed: i64, step: i64) -> Self {
        self.identity = Some((seed, step));
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn references(mut self, target: impl Into<String>) -> Self {
        self.references = Some(target.into());
        self
    }
}

/// What to do when the target table may already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistencePolicy {
    /// Drop any existing table, then create.
    DropFirst,
    /// Plain CREATE; the warehouse errors if the table exists.
    #[default]
    FailIfExists,
    /// CREATE TABLE IF NOT EXISTS; existing rows are kept.
    AppendIfExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistStyle {
    Auto,
    Even,
    Key,
    All,
}

impl DistStyle {
    pub fn keyword(&self) -> &'static str {
        match self {
            DistStyle::Auto => "AUTO",
            DistStyle::Even => "EVEN",
            DistStyle::Key => "KEY",
            DistStyle::All => "ALL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortStyle {
    #[default]
    Compound,
    Interleaved,
}

impl SortStyle {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortStyle::Compound => "COMPOUND",
            SortStyle::Interleaved => "INTERLEAVED",
        }
    }
}

/// A table to create or load into.
///
/// Only obtainable through [`TableDefinition::builder`] (or deserialization,
/// which runs the same checks), so every instance satisfies:
/// - at least one column,
/// - unique, quotable column names,
/// - at most one distribution key, consistent with the distribution style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TableDefinitionBuilder")]
pub struct TableDefinition {
    name: QualifiedName,
    columns: Vec<ColumnSpec>,
    existence: ExistencePolicy,
    temporary: bool,
    backup: Option<bool>,
    dist_style: Option<DistStyle>,
    sort_style: SortStyle,
}

impl TableDefinition {
    pub fn builder(name: QualifiedName) -> TableDefinitionBuilder {
        TableDefinitionBuilder {
            name,
            columns: Vec::new(),
            existence: ExistencePolicy::default(),
            temporary: false,
            backup: None,
            dist_style: None,
            sort_style: SortStyle::default(),
        }
    }

    pub fn name(&self) -> &QualifiedName {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn existence(&self) -> ExistencePolicy {
        self.existence
    }

    pub fn temporary(&self) -> bool {
        self.temporary
    }

    pub fn backup(&self) -> Option<bool> {
        self.backup
    }

    pub fn dist_style(&self) -> Option<DistStyle> {
        self.dist_style
    }

    pub fn sort_style(&self) -> SortStyle {
        self.sort_style
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn primary_keys(&self) -> Vec<&str> {
        self.keys(|c| c.is_primary_key)
    }

    pub fn sort_keys(&self) -> Vec<&str> {
        self.keys(|c| c.is_sort_key)
    }

    pub fn dist_key(&self) -> Option<&str> {
        self.keys(|c| c.is_dist_key).into_iter().next()
    }

    fn keys(&self, pred: impl Fn(&ColumnSpec) -> bool) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| pred(c))
            .map(|c| c.name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableDefinitionBuilder {
    name: QualifiedName,
    #[serde(default)]
    columns: Vec<ColumnSpec>,
    #[serde(default)]
    existence: ExistencePolicy,
    #[serde(default)]
    temporary: bool,
    #[serde(default)]
    backup: Option<bool>,
    #[serde(default)]
    dist_style: Option<DistStyle>,
    #[serde(default)]
    sort_style: SortStyle,
}

impl TableDefinitionBuilder {
    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    pub fn columns(mut self, columns: impl IntoIterator<Item = ColumnSpec>) -> Self {
        self.columns.extend(columns);
        self
    }

    pub fn existence(mut self, policy: ExistencePolicy) -> Self {
        self.existence = policy;
        self
    }

    pub fn temporary(mut self, temporary: bool) -> Self {
        self.temporary = temporary;
        self
    }

    pub fn backup(mut self, backup: bool) -> Self {
        self.backup = Some(backup);
        self
    }

    pub fn dist_style(mut self, style: DistStyle) -> Self {
        self.dist_style = Some(style);
        self
    }

    pub fn sort_style(mut self, style: SortStyle) -> Self {
        self.sort_style = style;
        self
    }

    /// Mark the named columns as sort keys, in column order.
    pub fn sort_keys<S: AsRef<str>>(mut self, names: &[S]) -> Result<Self> {
        for n in names {
            self.column_mut(n.as_ref())?.is_sort_key = true;
        }
        Ok(self)
    }

    pub fn primary_keys<S: AsRef<str>>(mut self, names: &[S]) -> Result<Self> {
        for n in names {
            self.column_mut(n.as_ref())?.is_primary_key = true;
        }
        Ok(self)
    }

    pub fn dist_key(mut self, name: &str) -> Result<Self> {
        self.column_mut(name)?.is_dist_key = true;
        Ok(self)
    }

    fn column_mut(&mut self, name: &str) -> Result<&mut ColumnSpec> {
        let table = self.name.to_string();
        self.columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| {
                BridgeError::InvalidTableDefinition(format!(
                    "table {} has no column named {}",
                    table, name
                ))
            })
    }

    pub fn build(self) -> Result<TableDefinition> {
        if self.columns.is_empty() {
            return Err(BridgeError::EmptyTableDefinition(self.name.to_string()));
        }

        let mut seen = HashSet::new();
        for c in &self.columns {
            validate_identifier(&c.name)?;
            if c.warehouse_type.trim().is_empty() {
                return Err(BridgeError::InvalidTableDefinition(format!(
                    "column {} has no type",
                    c.name
                )));
            }
            if !seen.insert(c.name.as_str()) {
                return Err(BridgeError::InvalidTableDefinition(format!(
                    "duplicate column name: {}",
                    c.name
                )));
            }
            if let Some((_, 0)) = c.identity {
                return Err(BridgeError::InvalidTableDefinition(format!(
                    "identity step for column {} cannot be zero",
                    c.name
                )));
            }
        }

        let dist_keys: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| c.is_dist_key)
            .map(|c| c.name.as_str())
            .collect();
        if dist_keys.len() > 1 {
            return Err(BridgeError::InvalidTableDefinition(format!(
                "at most one distribution key is allowed, got {}",
                dist_keys.join(", ")
            )));
        }
        match (self.dist_style, dist_keys.is_empty()) {
            (Some(style), false) if style != DistStyle::Key => {
                return Err(BridgeError::InvalidTableDefinition(format!(
                    "DISTSTYLE {} cannot be combined with a distribution key",
                    style.keyword()
                )));
            }
            (Some(DistStyle::Key), true) => {
                return Err(BridgeError::InvalidTableDefinition(
                    "DISTSTYLE KEY requires a distribution key column".into(),
                ));
            }
            _ => {}
        }

        Ok(TableDefinition {
            name: self.name,
            columns: self.columns,
            existence: self.existence,
            temporary: self.temporary,
            backup: self.backup,
            dist_style: self.dist_style,
            sort_style: self.sort_style,
        })
    }
}

impl TryFrom<TableDefinitionBuilder> for TableDefinition {
    type Error = BridgeError;

    fn try_from(builder: TableDefinitionBuilder) -> Result<Self> {
        builder.build()
    }
}
