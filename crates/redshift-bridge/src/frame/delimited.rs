//! Delimited text encoding of [`DataFrame`]s.
//!
//! This is the only on-the-wire format the bridge stages: loads write it,
//! reads and unload round trips parse it back.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};

use super::{DataFrame, SemanticType, Series, Value};
use crate::error::{BridgeError, Result};

/// Layout of a delimited file.
#[derive(Debug, Clone, PartialEq)]
pub struct DelimitedFormat {
    pub delimiter: u8,
    /// Quote character; `None` means fields are never quoted.
    pub quote: Option<u8>,
    /// Escape character used inside quoted fields instead of doubling quotes.
    pub escape: Option<u8>,
    pub header: bool,
    pub null_as: Option<String>,
    /// Column names to use when the file carries no header row.
    pub columns: Option<Vec<String>>,
}

impl Default for DelimitedFormat {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: Some(b'"'),
            escape: None,
            header: true,
            null_as: None,
            columns: None,
        }
    }
}

/// Serialize a frame into delimited bytes.
pub fn to_delimited(df: &DataFrame, format: &DelimitedFormat) -> Result<Vec<u8>> {
    let mut builder = WriterBuilder::new();
    builder.delimiter(format.delimiter).has_headers(false);
    match format.quote {
        Some(q) => {
            builder.quote(q).quote_style(QuoteStyle::Necessary);
            if let Some(e) = format.escape {
                builder.escape(e).double_quote(false);
            }
        }
        None => {
            builder.quote_style(QuoteStyle::Never);
        }
    }
    let mut writer = builder.from_writer(Vec::new());

    if format.header {
        writer.write_record(df.names())?;
    }

    let null_marker = format.null_as.as_deref().unwrap_or("");
    for idx in 0..df.height() {
        let mut record = Vec::with_capacity(df.width());
        for series in df.columns() {
            let field = series.values()[idx]
                .to_field()
                .unwrap_or_else(|| null_marker.to_string());
            if format.quote.is_none() && needs_quoting(&field, format.delimiter) {
                return Err(BridgeError::Frame(format!(
                    "column {} row {} contains the delimiter or a line break; \
                     use csv format to stage it",
                    series.name(),
                    idx
                )));
            }
            record.push(field);
        }
        writer.write_record(&record)?;
    }

    writer
        .into_inner()
        .map_err(|e| BridgeError::Frame(format!("failed to flush delimited writer: {}", e)))
}

fn needs_quoting(field: &str, delimiter: u8) -> bool {
    field
        .bytes()
        .any(|b| b == delimiter || b == b'\n' || b == b'\r')
}

/// Parse delimited bytes into a frame, sniffing each column's type.
pub fn from_delimited(data: &[u8], format: &DelimitedFormat) -> Result<DataFrame> {
    let mut builder = ReaderBuilder::new();
    builder
        .delimiter(format.delimiter)
        .has_headers(false)
        .flexible(false);
    match format.quote {
        Some(q) => {
            builder.quote(q).quoting(true);
            if let Some(e) = format.escape {
                builder.escape(Some(e)).double_quote(false);
            }
        }
        None => {
            builder.quoting(false);
        }
    }
    let mut reader = builder.from_reader(data);

    let mut records = reader.records();
    let header: Option<Vec<String>> = if format.header {
        match records.next() {
            Some(r) => Some(r?.iter().map(str::to_string).collect()),
            None => None,
        }
    } else {
        None
    };

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in records {
        rows.push(record?.iter().map(str::to_string).collect());
    }

    let width = header
        .as_ref()
        .map(Vec::len)
        .or_else(|| rows.first().map(Vec::len))
        .or_else(|| format.columns.as_ref().map(Vec::len))
        .unwrap_or(0);

    let names: Vec<String> = match (header, &format.columns) {
        (Some(h), _) => h,
        (None, Some(cols)) => {
            if cols.len() != width {
                return Err(BridgeError::Frame(format!(
                    "{} column names given for {} fields",
                    cols.len(),
                    width
                )));
            }
            cols.clone()
        }
        (None, None) => (0..width).map(|i| format!("column_{}", i)).collect(),
    };

    // With a marker only the marker is null and empty fields are empty text.
    let is_null = |f: &str| match format.null_as.as_deref() {
        Some(marker) => f == marker,
        None => f.is_empty(),
    };
    let rows: Vec<Vec<Option<String>>> = rows
        .into_iter()
        .map(|r| {
            r.into_iter()
                .map(|f| if is_null(&f) { None } else { Some(f) })
                .collect()
        })
        .collect();

    from_text_rows(names, &rows)
}

/// Build a frame from textual rows, sniffing each column's type.
///
/// `None` cells are nulls. Every row must have one cell per name.
pub fn from_text_rows(names: Vec<String>, rows: &[Vec<Option<String>>]) -> Result<DataFrame> {
    if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != names.len()) {
        return Err(BridgeError::Frame(format!(
            "row {} has {} fields, expected {}",
            idx,
            row.len(),
            names.len()
        )));
    }

    let mut series = Vec::with_capacity(names.len());
    for (col, name) in names.into_iter().enumerate() {
        let fields: Vec<Option<&str>> = rows.iter().map(|r| r[col].as_deref()).collect();
        let semantic_type = sniff(&fields);
        let values = fields
            .iter()
            .map(|f| f.map_or(Value::Null, |s| parse_as(&semantic_type, s)))
            .collect();
        series.push(Series::new(name, semantic_type, values)?);
    }

    DataFrame::new(series)
}

const CANDIDATES: [SemanticType; 6] = [
    SemanticType::Integer,
    SemanticType::Float,
    SemanticType::Boolean,
    SemanticType::Date,
    SemanticType::DateTime,
    SemanticType::DateTimeTz,
];

fn sniff(fields: &[Option<&str>]) -> SemanticType {
    let present: Vec<&str> = fields.iter().flatten().copied().collect();
    if present.is_empty() {
        return SemanticType::Text;
    }
    CANDIDATES
        .into_iter()
        .find(|t| present.iter().all(|s| try_parse(t, s).is_some()))
        .unwrap_or(SemanticType::Text)
}

fn parse_as(semantic_type: &SemanticType, s: &str) -> Value {
    try_parse(semantic_type, s).unwrap_or_else(|| Value::Text(s.to_string()))
}

fn try_parse(semantic_type: &SemanticType, s: &str) -> Option<Value> {
    match semantic_type {
        SemanticType::Integer => s.parse::<i64>().ok().map(Value::Int),
        SemanticType::Float => s.parse::<f64>().ok().map(Value::Float),
        SemanticType::Boolean => match s {
            "t" | "true" | "True" | "TRUE" => Some(Value::Bool(true)),
            "f" | "false" | "False" | "FALSE" => Some(Value::Bool(false)),
            _ => None,
        },
        SemanticType::Date => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .map(Value::Date),
        SemanticType::DateTime => ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .map(Value::DateTime),
        SemanticType::DateTimeTz => ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"]
            .iter()
            .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
            .map(|dt| Value::DateTimeTz(dt.with_timezone(&Utc))),
        _ => Some(Value::Text(s.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        DataFrame::new(vec![
            Series::infer("id", vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            Series::infer(
                "name",
                vec![Value::from("alpha"), Value::Null, Value::from("c, d")],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_write_csv_with_header() {
        let bytes = to_delimited(&sample(), &DelimitedFormat::default()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "id,name\n1,alpha\n2,\n3,\"c, d\"\n");
    }

    #[test]
    fn test_write_null_marker() {
        let format = DelimitedFormat {
            null_as: Some("\\N".into()),
            header: false,
            ..Default::default()
        };
        let text = String::from_utf8(to_delimited(&sample(), &format).unwrap()).unwrap();
        assert!(text.starts_with("1,alpha\n2,\\N\n"));
    }

    #[test]
    fn test_null_marker_keeps_empty_text_distinct() {
        let df = DataFrame::new(vec![Series::infer(
            "s",
            vec![Value::from(""), Value::Null, Value::from("x")],
        )])
        .unwrap();
        let format = DelimitedFormat {
            null_as: Some("\\N".into()),
            ..Default::default()
        };
        let bytes = to_delimited(&df, &format).unwrap();
        let back = from_delimited(&bytes, &format).unwrap();
        assert_eq!(
            back.column("s").unwrap().values(),
            &[Value::from(""), Value::Null, Value::from("x")]
        );
    }

    #[test]
    fn test_unquoted_rejects_embedded_delimiter() {
        let format = DelimitedFormat {
            quote: None,
            ..Default::default()
        };
        let err = to_delimited(&sample(), &format).unwrap_err();
        assert!(err.to_string().contains("column name row 2"));
    }

    #[test]
    fn test_read_sniffs_types() {
        let data = b"a|b|c|d|e\n1|2.5|t|2024-01-02|2024-01-02 03:04:05\n2||f|2024-01-03|2024-01-02 03:04:06.5\n";
        let format = DelimitedFormat {
            delimiter: b'|',
            ..Default::default()
        };
        let df = from_delimited(data, &format).unwrap();
        let types: Vec<_> = df.columns().iter().map(|s| s.semantic_type().clone()).collect();
        assert_eq!(
            types,
            vec![
                SemanticType::Integer,
                SemanticType::Float,
                SemanticType::Boolean,
                SemanticType::Date,
                SemanticType::DateTime,
            ]
        );
        assert_eq!(df.column("b").unwrap().values()[1], Value::Null);
    }

    #[test]
    fn test_read_timestamptz() {
        let data = b"ts\n2024-01-02 03:04:05+00\n";
        let df = from_delimited(data, &DelimitedFormat::default()).unwrap();
        assert_eq!(
            df.column("ts").unwrap().semantic_type(),
            &SemanticType::DateTimeTz
        );
    }

    #[test]
    fn test_read_without_header_uses_given_names() {
        let format = DelimitedFormat {
            header: false,
            columns: Some(vec!["x".into(), "y".into()]),
            ..Default::default()
        };
        let df = from_delimited(b"1,foo\n2,bar\n", &format).unwrap();
        assert_eq!(df.names().collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(df.column("y").unwrap().semantic_type(), &SemanticType::Text);

        let format = DelimitedFormat {
            header: false,
            ..Default::default()
        };
        let df = from_delimited(b"1,foo\n", &format).unwrap();
        assert_eq!(df.names().collect::<Vec<_>>(), vec!["column_0", "column_1"]);
    }

    #[test]
    fn test_read_escaped_quotes() {
        let format = DelimitedFormat {
            delimiter: b'|',
            escape: Some(b'\\'),
            header: false,
            ..Default::default()
        };
        let df = from_delimited(b"\"say \\\"hi\\\"\"|\"1\"\n", &format).unwrap();
        assert_eq!(df.columns()[0].values()[0], Value::from("say \"hi\""));
        assert_eq!(df.columns()[1].values()[0], Value::Int(1));
    }

    #[test]
    fn test_round_trip_preserves_values() {
        let df = sample();
        let format = DelimitedFormat::default();
        let back = from_delimited(&to_delimited(&df, &format).unwrap(), &format).unwrap();
        assert_eq!(back, df);
    }

    #[test]
    fn test_from_text_rows() {
        let rows = vec![
            vec![Some("1".to_string()), None],
            vec![Some("2".to_string()), Some("x".to_string())],
        ];
        let df = from_text_rows(vec!["n".into(), "s".into()], &rows).unwrap();
        assert_eq!(df.column("n").unwrap().semantic_type(), &SemanticType::Integer);
        assert_eq!(df.column("s").unwrap().values()[0], Value::Null);
        assert!(from_text_rows(vec!["n".into()], &rows).is_err());
    }

    #[test]
    fn test_ragged_rows_fail() {
        assert!(from_delimited(b"a,b\n1\n", &DelimitedFormat::default()).is_err());
    }
}
