//! Rendering of CREATE TABLE, COPY and UNLOAD statements.
//!
//! Every function here is pure: it validates its inputs and returns text.
//! Nothing in this module talks to the object store or the warehouse, so
//! option errors surface before any network call is made.

mod literal;
mod options;

pub use literal::{default_literal, quote_literal, redact};
pub use options::{
    CopyTuning, Credentials, Encryption, FileFormat, StagedLocation, TransferOptions,
    UnloadTuning, STAGED_NULL_MARKER,
};

use std::fmt;

use crate::error::{BridgeError, Result};
use crate::frame::Value;
use crate::schema::{quote, quote_list, ColumnSpec, ExistencePolicy, QualifiedName, TableDefinition};

/// Statement text plus positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedStatement {
    pub text: String,
    pub bound_values: Vec<Value>,
}

impl GeneratedStatement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bound_values: Vec::new(),
        }
    }

    pub fn with_values(text: impl Into<String>, bound_values: Vec<Value>) -> Self {
        Self {
            text: text.into(),
            bound_values,
        }
    }

    /// Text with credential literals masked, for logs and dry-run output.
    pub fn redacted(&self) -> String {
        redact(&self.text)
    }
}

/// Displays the redacted text.
impl fmt::Display for GeneratedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

pub fn build_drop_table(name: &QualifiedName) -> GeneratedStatement {
    GeneratedStatement::new(format!("DROP TABLE IF EXISTS {}", name.quoted()))
}

/// Render the DDL for a table definition.
pub fn build_create_table(def: &TableDefinition) -> Result<GeneratedStatement> {
    if def.columns().is_empty() {
        return Err(BridgeError::EmptyTableDefinition(def.name().to_string()));
    }

    let mut body: Vec<String> = def
        .columns()
        .iter()
        .map(column_clause)
        .collect::<Result<_>>()?;
    let pk = def.primary_keys();
    if !pk.is_empty() {
        body.push(format!("PRIMARY KEY ({})", quote_list(&pk)?));
    }

    let mut sql = String::new();
    if def.existence() == ExistencePolicy::DropFirst {
        sql.push_str(&build_drop_table(def.name()).text);
        sql.push_str(";\n");
    }
    sql.push_str("CREATE ");
    if def.temporary() {
        sql.push_str("TEMPORARY ");
    }
    sql.push_str("TABLE ");
    if def.existence() == ExistencePolicy::AppendIfExists {
        sql.push_str("IF NOT EXISTS ");
    }
    sql.push_str(&def.name().quoted());
    sql.push_str(" (\n    ");
    sql.push_str(&body.join(",\n    "));
    sql.push_str("\n)");

    if let Some(backup) = def.backup() {
        sql.push_str(if backup { "\nBACKUP YES" } else { "\nBACKUP NO" });
    }
    if let Some(style) = def.dist_style() {
        sql.push_str(&format!("\nDISTSTYLE {}", style.keyword()));
    }
    if let Some(dist) = def.dist_key() {
        sql.push_str(&format!("\nDISTKEY ({})", quote(dist)?));
    }
    let sort = def.sort_keys();
    if !sort.is_empty() {
        sql.push_str(&format!(
            "\n{} SORTKEY ({})",
            def.sort_style().keyword(),
            quote_list(&sort)?
        ));
    }

    Ok(GeneratedStatement::new(sql))
}

fn column_clause(c: &ColumnSpec) -> Result<String> {
    let mut clause = format!("{} {}", quote(&c.name)?, c.warehouse_type.trim());
    match (&c.default, c.identity) {
        (Some(_), Some(_)) => {
            return Err(BridgeError::InvalidTableDefinition(format!(
                "column {} cannot have both DEFAULT and IDENTITY",
                c.name
            )));
        }
        (Some(d), None) => clause.push_str(&format!(" DEFAULT {}", default_literal(d))),
        (None, Some((seed, step))) => clause.push_str(&format!(" IDENTITY({}, {})", seed, step)),
        (None, None) => {}
    }
    if let Some(enc) = &c.encoding {
        if enc.is_empty() || !enc.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
            return Err(BridgeError::InvalidTableDefinition(format!(
                "invalid encoding {:?} for column {}",
                enc, c.name
            )));
        }
        clause.push_str(&format!(" ENCODE {}", enc));
    }
    if !c.nullable {
        clause.push_str(" NOT NULL");
    }
    if c.unique {
        clause.push_str(" UNIQUE");
    }
    if let Some(target) = &c.references {
        clause.push_str(&format!(" REFERENCES {}", target));
    }
    Ok(clause)
}

fn credentials_clause(opts: &TransferOptions) -> Result<String> {
    Ok(match opts.require_credentials()? {
        Credentials::IamRole { arn } => format!("IAM_ROLE {}", quote_literal(arn)),
        Credentials::AccessKey {
            access_key_id,
            secret_access_key,
            session_token,
        } => {
            let mut s = format!(
                "ACCESS_KEY_ID {}\nSECRET_ACCESS_KEY {}",
                quote_literal(access_key_id),
                quote_literal(secret_access_key)
            );
            if let Some(token) = session_token {
                s.push_str(&format!("\nSESSION_TOKEN {}", quote_literal(token)));
            }
            s
        }
    })
}

/// Render a COPY from a staged object into `target`.
///
/// `columns` restricts and orders the target columns; `None` loads by
/// position.
pub fn build_load_statement(
    target: &QualifiedName,
    source: &StagedLocation,
    columns: Option<&[String]>,
    opts: &TransferOptions,
) -> Result<GeneratedStatement> {
    opts.validate_for_load()?;

    let mut clauses = Vec::new();
    match columns {
        Some(cols) if !cols.is_empty() => {
            clauses.push(format!("COPY {} ({})", target.quoted(), quote_list(cols)?))
        }
        _ => clauses.push(format!("COPY {}", target.quoted())),
    }
    clauses.push(format!("FROM {}", quote_literal(&source.uri())));
    clauses.push(credentials_clause(opts)?);
    if let Some(region) = &opts.region {
        clauses.push(format!("REGION {}", quote_literal(region)));
    }
    if opts.format == FileFormat::Csv {
        clauses.push(format!("CSV QUOTE AS {}", quote_literal(&opts.quote.to_string())));
    }
    clauses.push(format!(
        "DELIMITER {}",
        quote_literal(&opts.delimiter.to_string())
    ));
    if let Some(codec) = opts.compression.keyword() {
        clauses.push(codec.to_string());
    }
    if opts.header {
        clauses.push("IGNOREHEADER 1".to_string());
    }
    if let Some(null) = &opts.null_as {
        clauses.push(format!("NULL AS {}", quote_literal(null)));
    }

    let t = &opts.copy;
    if let Some(f) = &t.date_format {
        clauses.push(format!("DATEFORMAT {}", quote_literal(f)));
    }
    if let Some(f) = &t.time_format {
        clauses.push(format!("TIMEFORMAT {}", quote_literal(f)));
    }
    if let Some(c) = t.accept_inv_chars {
        clauses.push(format!("ACCEPTINVCHARS AS {}", quote_literal(&c.to_string())));
    }
    if let Some(enc) = &t.encoding {
        clauses.push(format!("ENCODING AS {}", enc.to_ascii_uppercase()));
    }
    if let Some(n) = t.max_error {
        clauses.push(format!("MAXERROR {}", n));
    }
    if let Some(on) = t.comp_update {
        clauses.push(format!("COMPUPDATE {}", on_off(on)));
    }
    if let Some(on) = t.stat_update {
        clauses.push(format!("STATUPDATE {}", on_off(on)));
    }
    for (set, keyword) in [
        (t.accept_any_date, "ACCEPTANYDATE"),
        (t.blanks_as_null, "BLANKSASNULL"),
        (t.empty_as_null, "EMPTYASNULL"),
        (t.escape, "ESCAPE"),
        (t.explicit_ids, "EXPLICIT_IDS"),
        (t.fill_record, "FILLRECORD"),
        (t.ignore_blank_lines, "IGNOREBLANKLINES"),
        (t.remove_quotes, "REMOVEQUOTES"),
        (t.round_ec, "ROUNDEC"),
        (t.trim_blanks, "TRIMBLANKS"),
        (t.truncate_columns, "TRUNCATECOLUMNS"),
    ] {
        if set {
            clauses.push(keyword.to_string());
        }
    }

    if opts.manifest {
        clauses.push("MANIFEST".to_string());
    }

    Ok(GeneratedStatement::new(clauses.join("\n")))
}

fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

/// Render an UNLOAD of `query` to `destination`.
///
/// The destination key is a prefix; the warehouse appends part numbers. The
/// MANIFEST clause, when requested, is always last.
pub fn build_unload_statement(
    query: &str,
    destination: &StagedLocation,
    opts: &TransferOptions,
) -> Result<GeneratedStatement> {
    opts.validate_for_unload()?;

    let query = query.trim().trim_end_matches(';').trim_end();
    if query.is_empty() {
        return Err(BridgeError::options("UNLOAD query cannot be empty"));
    }
    let prefix = destination.unload_prefix(opts.file_prefix.as_deref());
    if prefix.is_empty() {
        return Err(BridgeError::options(format!(
            "UNLOAD destination s3://{}/ needs a key prefix",
            destination.bucket
        )));
    }
    let target = StagedLocation::new(&destination.bucket, prefix);

    let mut clauses = vec![
        format!("UNLOAD ({})", quote_literal(query)),
        format!("TO {}", quote_literal(&target.uri())),
        credentials_clause(opts)?,
    ];
    if let Some(region) = &opts.region {
        clauses.push(format!("REGION {}", quote_literal(region)));
    }
    if opts.format == FileFormat::Csv {
        clauses.push("FORMAT AS CSV".to_string());
    }
    clauses.push(format!(
        "DELIMITER AS {}",
        quote_literal(&opts.delimiter.to_string())
    ));
    if opts.header {
        clauses.push("HEADER".to_string());
    }
    if opts.unload.add_quotes {
        clauses.push("ADDQUOTES".to_string());
    }
    if let Some(null) = &opts.null_as {
        clauses.push(format!("NULL AS {}", quote_literal(null)));
    }
    if opts.unload.escape {
        clauses.push("ESCAPE".to_string());
    }
    if let Some(codec) = opts.compression.keyword() {
        clauses.push(codec.to_string());
    }
    match &opts.encryption {
        Encryption::None => {}
        Encryption::Sse => clauses.push("ENCRYPTED AUTO".to_string()),
        Encryption::SseKms { key_id } => {
            clauses.push(format!("KMS_KEY_ID {} ENCRYPTED", quote_literal(key_id)))
        }
    }
    if let Some(ext) = &opts.file_suffix {
        clauses.push(format!(
            "EXTENSION {}",
            quote_literal(ext.trim_start_matches('.'))
        ));
    }
    if opts.unload.allow_overwrite {
        clauses.push("ALLOWOVERWRITE".to_string());
    }
    if !opts.unload.parallel {
        clauses.push("PARALLEL OFF".to_string());
    }
    if let Some(mb) = opts.unload.max_file_size_mb {
        clauses.push(format!("MAXFILESIZE {} MB", mb));
    }
    if opts.manifest {
        clauses.push("MANIFEST".to_string());
    }

    Ok(GeneratedStatement::new(clauses.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Compression;
    use crate::schema::{DistStyle, SortStyle};

    fn name(s: &str) -> QualifiedName {
        s.parse().unwrap()
    }

    fn opts() -> TransferOptions {
        TransferOptions::iam_role("arn:aws:iam::123456789012:role/loader")
    }

    fn two_int_columns() -> TableDefinition {
        TableDefinition::builder(name("t"))
            .column(ColumnSpec::new("col1", "integer"))
            .column(ColumnSpec::new("col2", "integer"))
            .sort_keys(&["col2"])
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_create_table_sort_key_scenario() {
        let stmt = build_create_table(&two_int_columns()).unwrap();
        let col1 = stmt.text.find("\"col1\" integer").unwrap();
        let col2 = stmt.text.find("\"col2\" integer").unwrap();
        assert!(col1 < col2);
        assert!(stmt.text.ends_with("COMPOUND SORTKEY (\"col2\")"));
        assert!(!stmt.text.contains("\"col1\")"));
        assert!(!stmt.text.contains("DISTKEY"));
        assert!(!stmt.text.contains("PRIMARY KEY"));
        assert!(stmt.bound_values.is_empty());
    }

    #[test]
    fn test_create_table_each_column_once_in_order() {
        let names = ["id", "user", "order", "amount"];
        let def = TableDefinition::builder(name("s.orders"))
            .columns(names.iter().map(|n| ColumnSpec::new(*n, "integer")))
            .build()
            .unwrap();
        let text = build_create_table(&def).unwrap().text;
        let mut last = 0;
        for n in names {
            let quoted = format!("\"{}\"", n);
            assert_eq!(text.matches(&quoted).count(), 1, "{}", n);
            let at = text.find(&quoted).unwrap();
            assert!(at > last);
            last = at;
        }
        assert!(text.starts_with("CREATE TABLE \"s\".\"orders\" ("));
    }

    #[test]
    fn test_drop_first_precedes_create() {
        let def = TableDefinition::builder(name("t"))
            .column(ColumnSpec::new("a", "integer"))
            .existence(ExistencePolicy::DropFirst)
            .build()
            .unwrap();
        let text = build_create_table(&def).unwrap().text;
        let drop = text.find("DROP TABLE IF EXISTS \"t\"").unwrap();
        let create = text.find("CREATE TABLE \"t\"").unwrap();
        assert!(drop < create);
    }

    #[test]
    fn test_append_if_exists() {
        let def = TableDefinition::builder(name("t"))
            .column(ColumnSpec::new("a", "integer"))
            .existence(ExistencePolicy::AppendIfExists)
            .temporary(true)
            .build()
            .unwrap();
        let text = build_create_table(&def).unwrap().text;
        assert!(text.starts_with("CREATE TEMPORARY TABLE IF NOT EXISTS \"t\""));
        assert!(!text.contains("DROP"));
    }

    #[test]
    fn test_create_table_full_attributes() {
        let def = TableDefinition::builder(name("events"))
            .column(
                ColumnSpec::new("id", "bigint")
                    .identity(1, 1)
                    .primary_key()
                    .not_null(),
            )
            .column(ColumnSpec::new("kind", "varchar(16)").with_default("click").encode("zstd"))
            .column(ColumnSpec::new("ts", "timestamp").sort_key())
            .column(ColumnSpec::new("user_id", "integer").dist_key().references("users(id)"))
            .dist_style(DistStyle::Key)
            .sort_style(SortStyle::Interleaved)
            .backup(false)
            .build()
            .unwrap();
        let text = build_create_table(&def).unwrap().text;
        assert!(text.contains("\"id\" bigint IDENTITY(1, 1) NOT NULL"));
        assert!(text.contains("\"kind\" varchar(16) DEFAULT 'click' ENCODE zstd"));
        assert!(text.contains("\"user_id\" integer REFERENCES users(id)"));
        assert!(text.contains("PRIMARY KEY (\"id\")\n)"));
        assert!(text.contains("\nBACKUP NO\nDISTSTYLE KEY\nDISTKEY (\"user_id\")"));
        assert!(text.ends_with("INTERLEAVED SORTKEY (\"ts\")"));
    }

    #[test]
    fn test_default_and_identity_conflict() {
        let def = TableDefinition::builder(name("t"))
            .column(ColumnSpec::new("a", "integer").identity(1, 1).with_default("0"))
            .build()
            .unwrap();
        assert!(build_create_table(&def).is_err());
    }

    #[test]
    fn test_load_statement_defaults() {
        let loc = StagedLocation::new("bucket", "stage/t.csv");
        let stmt = build_load_statement(&name("t"), &loc, None, &opts()).unwrap();
        assert_eq!(
            stmt.text,
            "COPY \"t\"\n\
             FROM 's3://bucket/stage/t.csv'\n\
             IAM_ROLE 'arn:aws:iam::123456789012:role/loader'\n\
             CSV QUOTE AS '\"'\n\
             DELIMITER ','\n\
             IGNOREHEADER 1\n\
             DATEFORMAT 'auto'\n\
             TIMEFORMAT 'auto'"
        );
    }

    #[test]
    fn test_load_statement_column_subset_and_manifest_last() {
        let loc = StagedLocation::new("bucket", "stage/t.manifest");
        let mut o = opts();
        o.format = FileFormat::Delimited;
        o.delimiter = '|';
        o.compression = Compression::Gzip;
        o.manifest = true;
        o.header = false;
        o.copy.escape = true;
        o.copy.encoding = Some("utf8".into());
        o.copy.truncate_columns = true;
        o.region = Some("us-west-2".into());
        let cols = vec!["b".to_string(), "a".to_string()];
        let text = build_load_statement(&name("t"), &loc, Some(&cols), &o)
            .unwrap()
            .text;
        assert!(text.starts_with("COPY \"t\" (\"b\", \"a\")\n"));
        assert!(text.contains("\nREGION 'us-west-2'\n"));
        assert!(!text.contains("CSV"));
        assert!(text.contains("\nDELIMITER '|'\nGZIP\n"));
        assert!(text.contains("\nENCODING AS UTF8\n"));
        assert!(text.contains("\nESCAPE\n"));
        assert!(!text.contains("IGNOREHEADER"));
        assert!(text.ends_with("TRUNCATECOLUMNS\nMANIFEST"));
    }

    #[test]
    fn test_load_rejects_header_with_manifest() {
        let loc = StagedLocation::new("bucket", "stage/t.manifest");
        let mut o = opts();
        o.manifest = true;
        let err = build_load_statement(&name("t"), &loc, None, &o).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidTransferOptions(_)));
    }

    #[test]
    fn test_load_rejects_unknown_encoding() {
        let loc = StagedLocation::new("bucket", "k");
        let mut o = opts();
        o.copy.encoding = Some("UTF8\nMAXERROR 100000".into());
        let err = build_load_statement(&name("t"), &loc, None, &o).unwrap_err();
        assert!(err.to_string().contains("encoding"));
    }

    #[test]
    fn test_load_null_marker_follows_options() {
        let loc = StagedLocation::new("bucket", "k");
        let mut o = opts();
        o.null_as = Some("NULL".into());
        let text = build_load_statement(&name("t"), &loc, None, &o).unwrap().text;
        assert!(text.contains("\nNULL AS 'NULL'\n"));
        assert_eq!(text.matches("NULL AS").count(), 1);
    }

    #[test]
    fn test_load_with_access_keys_is_redacted() {
        let loc = StagedLocation::new("bucket", "k");
        let o = TransferOptions::default().with_credentials(Credentials::AccessKey {
            access_key_id: "AKIAXXXX".into(),
            secret_access_key: "hunter2".into(),
            session_token: None,
        });
        let stmt = build_load_statement(&name("t"), &loc, None, &o).unwrap();
        assert!(stmt.text.contains("SECRET_ACCESS_KEY 'hunter2'"));
        let shown = stmt.to_string();
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("AKIAXXXX"));
        assert!(!shown.contains("SESSION_TOKEN"));
    }

    #[test]
    fn test_load_rejects_before_rendering() {
        let loc = StagedLocation::new("bucket", "k");
        let err = build_load_statement(&name("t"), &loc, None, &TransferOptions::default())
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidTransferOptions(_)));
    }

    #[test]
    fn test_unload_statement() {
        let dest = StagedLocation::new("bucket", "exports/");
        let mut o = opts();
        o.file_prefix = Some("orders_".into());
        o.compression = Compression::Gzip;
        o.unload.parallel = false;
        o.unload.allow_overwrite = true;
        o.unload.max_file_size_mb = Some(100);
        o.manifest = true;
        o.file_suffix = Some(".csv".into());
        let text = build_unload_statement("SELECT * FROM t WHERE s = 'x';\n", &dest, &o)
            .unwrap()
            .text;
        assert!(text.starts_with("UNLOAD ('SELECT * FROM t WHERE s = ''x''')\n"));
        assert!(text.contains("\nTO 's3://bucket/exports/orders_'\n"));
        assert!(text.contains("\nFORMAT AS CSV\nDELIMITER AS ','\nHEADER\nGZIP\n"));
        assert!(text.contains("\nEXTENSION 'csv'\n"));
        assert!(text.contains("\nPARALLEL OFF\nMAXFILESIZE 100 MB\n"));
        assert!(text.ends_with("\nMANIFEST"));
    }

    #[test]
    fn test_unload_encryption_clauses() {
        let dest = StagedLocation::new("bucket", "out/x_");
        let mut o = opts();
        o.encryption = Encryption::SseKms {
            key_id: "kms-1".into(),
        };
        let text = build_unload_statement("select 1", &dest, &o).unwrap().text;
        assert!(text.contains("KMS_KEY_ID 'kms-1' ENCRYPTED"));

        o.encryption = Encryption::Sse;
        let text = build_unload_statement("select 1", &dest, &o).unwrap().text;
        assert!(text.contains("\nENCRYPTED AUTO"));
    }

    #[test]
    fn test_unload_rejections() {
        let dest = StagedLocation::new("bucket", "out/");
        assert!(build_unload_statement("  ;", &dest, &opts()).is_err());
        assert!(build_unload_statement("select 1", &StagedLocation::new("b", ""), &opts()).is_err());
        let mut o = opts();
        o.compression = Compression::Lzop;
        let err = build_unload_statement("select 1", &dest, &o).unwrap_err();
        assert!(err.to_string().contains("LZOP"));
    }
}
