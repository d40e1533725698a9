//! Type mapping from in-memory columns to Redshift.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::frame::{DataFrame, SemanticType, Series};
use crate::schema::ColumnSpec;

const SMALLINT_MAX: u64 = i16::MAX as u64;
const INTEGER_MAX: u64 = i32::MAX as u64;
const NUMERIC_MAX_PRECISION: u32 = 38;

/// Bounds for `varchar(n)` sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextSizing {
    /// Smallest width emitted, in bytes.
    pub floor: usize,
    /// Widest `varchar(n)`; anything longer becomes `varchar(max)`.
    pub cap: usize,
}

impl Default for TextSizing {
    fn default() -> Self {
        Self {
            floor: 256,
            cap: 65535,
        }
    }
}

/// What the mapper knows about a column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnProfile {
    pub name: String,
    pub semantic_type: SemanticType,
    pub override_type: Option<String>,
    pub max_abs_int: Option<u64>,
    pub max_text_bytes: Option<usize>,
}

impl ColumnProfile {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic_type,
            override_type: None,
            max_abs_int: None,
            max_text_bytes: None,
        }
    }

    pub fn from_series(series: &Series) -> Self {
        Self {
            name: series.name().to_string(),
            semantic_type: series.semantic_type().clone(),
            override_type: None,
            max_abs_int: series.max_abs_int(),
            max_text_bytes: series.max_text_bytes(),
        }
    }

    pub fn with_override(mut self, warehouse_type: impl Into<String>) -> Self {
        self.override_type = Some(warehouse_type.into());
        self
    }
}

/// Infers Redshift column types.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeMapper {
    sizing: TextSizing,
}

impl TypeMapper {
    pub fn new(sizing: TextSizing) -> Self {
        Self { sizing }
    }

    /// Map one column to a warehouse type token.
    pub fn infer(&self, column: &ColumnProfile) -> Result<String> {
        if let Some(explicit) = &column.override_type {
            return Ok(explicit.clone());
        }

        let token = match &column.semantic_type {
            SemanticType::Integer => match column.max_abs_int {
                Some(v) if v <= SMALLINT_MAX => "smallint".to_string(),
                Some(v) if v <= INTEGER_MAX => "integer".to_string(),
                Some(_) => "bigint".to_string(),
                None => "integer".to_string(),
            },
            SemanticType::Float => "double precision".to_string(),
            SemanticType::Decimal { precision, scale } => {
                if *precision == 0 || *precision > NUMERIC_MAX_PRECISION || scale > precision {
                    return Err(BridgeError::unsupported(
                        &column.name,
                        column.semantic_type.to_string(),
                        format!(
                            "numeric precision must be 1..={} with scale <= precision",
                            NUMERIC_MAX_PRECISION
                        ),
                    ));
                }
                format!("numeric({},{})", precision, scale)
            }
            SemanticType::Boolean => "boolean".to_string(),
            SemanticType::Text | SemanticType::Categorical => {
                let longest = column.max_text_bytes.unwrap_or(0);
                if longest > self.sizing.cap {
                    "varchar(max)".to_string()
                } else {
                    format!("varchar({})", longest.max(self.sizing.floor))
                }
            }
            SemanticType::Date => "date".to_string(),
            SemanticType::DateTime => "timestamp".to_string(),
            SemanticType::DateTimeTz => "timestamptz".to_string(),
            SemanticType::Duration | SemanticType::Binary => {
                return Err(BridgeError::unsupported(
                    &column.name,
                    column.semantic_type.to_string(),
                    "no Redshift column type holds this kind of value",
                ));
            }
        };
        Ok(token)
    }

    /// Derive column specs for every column of a frame, in frame order.
    ///
    /// `overrides` maps column names to explicit warehouse types.
    pub fn infer_columns(
        &self,
        df: &DataFrame,
        overrides: &HashMap<String, String>,
    ) -> Result<Vec<ColumnSpec>> {
        df.columns()
            .iter()
            .map(|series| {
                let mut profile = ColumnProfile::from_series(series);
                if let Some(t) = overrides.get(series.name()) {
                    profile = profile.with_override(t);
                }
                let mut column = ColumnSpec::new(series.name(), self.infer(&profile)?);
                column.nullable = series.is_empty() || series.null_count() > 0;
                Ok(column)
            })
            .collect()
    }
}
