//! In-memory columnar tables.
//!
//! A [`DataFrame`] is an ordered set of equally long [`Series`]. It is the
//! local side of every transfer: loads serialize it into a delimited file,
//! reads and queries parse results back into one.

mod delimited;
mod value;

pub use delimited::{from_delimited, from_text_rows, to_delimited, DelimitedFormat};
pub use value::{SemanticType, Value};

use std::collections::HashSet;

use crate::error::{BridgeError, Result};

/// A named, typed column.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    name: String,
    semantic_type: SemanticType,
    values: Vec<Value>,
}

impl Series {
    /// Create a series, checking every value against the declared type.
    pub fn new(
        name: impl Into<String>,
        semantic_type: SemanticType,
        values: Vec<Value>,
    ) -> Result<Self> {
        let name = name.into();
        if let Some((idx, bad)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| !semantic_type.accepts(v))
        {
            return Err(BridgeError::Frame(format!(
                "column {} row {}: value {:?} is not {}",
                name, idx, bad, semantic_type
            )));
        }
        Ok(Self {
            name,
            semantic_type,
            values,
        })
    }

    /// Create a series whose type is derived from its values.
    ///
    /// Mixed integers and floats widen to float; any other mix widens to
    /// text. An all-null column is text.
    pub fn infer(name: impl Into<String>, values: Vec<Value>) -> Self {
        let mut inferred: Option<SemanticType> = None;
        for v in &values {
            let Some(t) = SemanticType::of(v) else { continue };
            inferred = Some(match inferred {
                None => t,
                Some(prev) => unify(prev, t),
            });
        }
        let semantic_type = inferred.unwrap_or(SemanticType::Text);
        let values = if semantic_type == SemanticType::Text {
            values.into_iter().map(as_text).collect()
        } else if semantic_type == SemanticType::Float {
            values.into_iter().map(as_float).collect()
        } else {
            values
        };
        Self {
            name: name.into(),
            semantic_type,
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn semantic_type(&self) -> &SemanticType {
        &self.semantic_type
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    /// Largest absolute integer value, if the column holds any integers.
    pub fn max_abs_int(&self) -> Option<u64> {
        self.values
            .iter()
            .filter_map(|v| match v {
                Value::Int(i) => Some(i.unsigned_abs()),
                _ => None,
            })
            .max()
    }

    /// Longest text value in bytes, if the column holds any text.
    pub fn max_text_bytes(&self) -> Option<usize> {
        self.values
            .iter()
            .filter_map(|v| match v {
                Value::Text(s) => Some(s.len()),
                _ => None,
            })
            .max()
    }
}

fn unify(a: SemanticType, b: SemanticType) -> SemanticType {
    use SemanticType::*;
    match (a, b) {
        (a, b) if a == b => a,
        (Integer, Float) | (Float, Integer) => Float,
        (Decimal { precision, scale }, Decimal { scale: s2, .. }) => Decimal {
            precision,
            scale: scale.max(s2),
        },
        _ => Text,
    }
}

fn as_text(v: Value) -> Value {
    match v {
        Value::Null | Value::Text(_) => v,
        other => other.to_field().map_or(Value::Null, Value::Text),
    }
}

fn as_float(v: Value) -> Value {
    match v {
        Value::Int(i) => Value::Float(i as f64),
        other => other,
    }
}

/// An ordered collection of equally long columns with unique names.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataFrame {
    columns: Vec<Series>,
}

impl DataFrame {
    pub fn new(columns: Vec<Series>) -> Result<Self> {
        let mut seen = HashSet::new();
        for s in &columns {
            if !seen.insert(s.name.as_str()) {
                return Err(BridgeError::Frame(format!(
                    "duplicate column name: {}",
                    s.name
                )));
            }
        }
        if let Some(first) = columns.first() {
            if let Some(bad) = columns.iter().find(|s| s.len() != first.len()) {
                return Err(BridgeError::Frame(format!(
                    "column {} has {} rows, expected {}",
                    bad.name,
                    bad.len(),
                    first.len()
                )));
            }
        }
        Ok(Self { columns })
    }

    /// Build a frame from row-major data, inferring each column's type.
    pub fn from_rows(names: &[String], rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut cols: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); names.len()];
        for (idx, row) in rows.into_iter().enumerate() {
            if row.len() != names.len() {
                return Err(BridgeError::Frame(format!(
                    "row {} has {} fields, expected {}",
                    idx,
                    row.len(),
                    names.len()
                )));
            }
            for (col, v) in cols.iter_mut().zip(row) {
                col.push(v);
            }
        }
        let series = names
            .iter()
            .zip(cols)
            .map(|(n, values)| Series::infer(n.clone(), values))
            .collect();
        Self::new(series)
    }

    /// Stack frames vertically. All frames must share column names in order.
    pub fn concat(frames: Vec<DataFrame>) -> Result<Self> {
        let mut iter = frames.into_iter();
        let Some(first) = iter.next() else {
            return Ok(Self::default());
        };
        let names: Vec<String> = first.names().map(str::to_string).collect();
        let mut cols: Vec<Vec<Value>> = first.columns.into_iter().map(|s| s.values).collect();
        for frame in iter {
            let other: Vec<&str> = frame.names().collect();
            if other != names.iter().map(String::as_str).collect::<Vec<_>>() {
                return Err(BridgeError::Frame(format!(
                    "cannot concatenate frames with columns {:?} and {:?}",
                    names, other
                )));
            }
            for (col, s) in cols.iter_mut().zip(frame.columns) {
                col.extend(s.values);
            }
        }
        let series = names
            .into_iter()
            .zip(cols)
            .map(|(n, values)| Series::infer(n, values))
            .collect();
        Self::new(series)
    }

    pub fn columns(&self) -> &[Series] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Series> {
        self.columns.iter().find(|s| s.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|s| s.name.as_str())
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn height(&self) -> usize {
        self.columns.first().map_or(0, Series::len)
    }

    pub fn row(&self, idx: usize) -> Option<Vec<&Value>> {
        if idx >= self.height() {
            return None;
        }
        Some(self.columns.iter().map(|s| &s.values[idx]).collect())
    }

    /// Reorder or subset columns by name.
    pub fn select(&self, names: &[String]) -> Result<Self> {
        let columns = names
            .iter()
            .map(|n| {
                self.column(n)
                    .cloned()
                    .ok_or_else(|| BridgeError::Frame(format!("no column named {}", n)))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(ns: &[&str]) -> Vec<String> {
        ns.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_new_rejects_duplicate_names() {
        let a = Series::infer("a", vec![Value::Int(1)]);
        let err = DataFrame::new(vec![a.clone(), a]).unwrap_err();
        assert!(err.to_string().contains("duplicate column name"));
    }

    #[test]
    fn test_new_rejects_ragged_columns() {
        let a = Series::infer("a", vec![Value::Int(1), Value::Int(2)]);
        let b = Series::infer("b", vec![Value::Int(1)]);
        assert!(DataFrame::new(vec![a, b]).is_err());
    }

    #[test]
    fn test_series_new_checks_values() {
        let err = Series::new("a", SemanticType::Integer, vec![Value::from("x")]).unwrap_err();
        assert!(err.to_string().contains("row 0"));
    }

    #[test]
    fn test_infer_widens() {
        let s = Series::infer("n", vec![Value::Int(1), Value::Float(2.5), Value::Null]);
        assert_eq!(s.semantic_type(), &SemanticType::Float);
        assert_eq!(s.values()[0], Value::Float(1.0));

        let s = Series::infer("m", vec![Value::Int(1), Value::from("x")]);
        assert_eq!(s.semantic_type(), &SemanticType::Text);
        assert_eq!(s.values()[0], Value::from("1"));

        let s = Series::infer("e", vec![Value::Null]);
        assert_eq!(s.semantic_type(), &SemanticType::Text);
    }

    #[test]
    fn test_statistics() {
        let s = Series::infer("n", vec![Value::Int(-40000), Value::Int(3), Value::Null]);
        assert_eq!(s.max_abs_int(), Some(40000));
        assert_eq!(s.null_count(), 1);

        let t = Series::infer("t", vec![Value::from("ab"), Value::from("héllo")]);
        assert_eq!(t.max_text_bytes(), Some(6));
    }

    #[test]
    fn test_from_rows_and_row() {
        let df = DataFrame::from_rows(
            &names(&["a", "b"]),
            vec![
                vec![Value::Int(1), Value::from("x")],
                vec![Value::Int(2), Value::from("y")],
            ],
        )
        .unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 2);
        assert_eq!(df.row(1).unwrap(), vec![&Value::Int(2), &Value::from("y")]);
        assert!(df.row(2).is_none());
    }

    #[test]
    fn test_concat() {
        let a = DataFrame::from_rows(&names(&["a"]), vec![vec![Value::Int(1)]]).unwrap();
        let b = DataFrame::from_rows(&names(&["a"]), vec![vec![Value::Int(2)]]).unwrap();
        let c = DataFrame::concat(vec![a, b]).unwrap();
        assert_eq!(c.height(), 2);

        let d = DataFrame::from_rows(&names(&["z"]), vec![vec![Value::Int(2)]]).unwrap();
        assert!(DataFrame::concat(vec![c, d]).is_err());
        assert_eq!(DataFrame::concat(vec![]).unwrap().width(), 0);
    }

    #[test]
    fn test_select() {
        let df = DataFrame::from_rows(
            &names(&["a", "b"]),
            vec![vec![Value::Int(1), Value::from("x")]],
        )
        .unwrap();
        let sel = df.select(&names(&["b", "a"])).unwrap();
        assert_eq!(sel.names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert!(df.select(&names(&["nope"])).is_err());
    }
}
