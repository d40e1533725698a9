//! Transfer options shared by load, unload and read.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::Compression;
use crate::error::{BridgeError, Result};
use crate::frame::DelimitedFormat;

/// Null marker written into staged files when `null_as` is unset. Empty
/// fields then stay empty strings on load.
pub const STAGED_NULL_MARKER: &str = "\\N";

/// Text encodings COPY accepts.
const COPY_ENCODINGS: [&str; 4] = ["UTF8", "UTF16", "UTF16LE", "UTF16BE"];

/// Text layout of staged files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// RFC 4180 style quoting.
    #[default]
    Csv,
    /// Plain character-delimited text with no quoting.
    Delimited,
}

/// Server-side encryption of unloaded files.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Encryption {
    #[default]
    None,
    /// Bucket-default KMS key.
    Sse,
    SseKms { key_id: String },
}

/// How the warehouse authenticates against the object store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    IamRole {
        arn: String,
    },
    AccessKey {
        access_key_id: String,
        secret_access_key: String,
        #[serde(default)]
        session_token: Option<String>,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::IamRole { arn } => f.debug_struct("IamRole").field("arn", arn).finish(),
            Credentials::AccessKey { session_token, .. } => f
                .debug_struct("AccessKey")
                .field("access_key_id", &"[REDACTED]")
                .field("secret_access_key", &"[REDACTED]")
                .field("session_token", &session_token.as_ref().map(|_| "[REDACTED]"))
                .finish(),
        }
    }
}

/// COPY-only switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyTuning {
    pub date_format: Option<String>,
    pub time_format: Option<String>,
    pub accept_inv_chars: Option<char>,
    pub accept_any_date: bool,
    pub blanks_as_null: bool,
    pub empty_as_null: bool,
    pub escape: bool,
    pub explicit_ids: bool,
    pub fill_record: bool,
    pub ignore_blank_lines: bool,
    pub remove_quotes: bool,
    pub round_ec: bool,
    pub trim_blanks: bool,
    pub truncate_columns: bool,
    pub encoding: Option<String>,
    pub max_error: Option<u32>,
    pub comp_update: Option<bool>,
    pub stat_update: Option<bool>,
}

impl Default for CopyTuning {
    fn default() -> Self {
        Self {
            date_format: Some("auto".into()),
            time_format: Some("auto".into()),
            accept_inv_chars: None,
            accept_any_date: false,
            blanks_as_null: false,
            empty_as_null: false,
            escape: false,
            explicit_ids: false,
            fill_record: false,
            ignore_blank_lines: false,
            remove_quotes: false,
            round_ec: false,
            trim_blanks: false,
            truncate_columns: false,
            encoding: None,
            max_error: None,
            comp_update: None,
            stat_update: None,
        }
    }
}

/// UNLOAD-only switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnloadTuning {
    pub add_quotes: bool,
    pub escape: bool,
    pub allow_overwrite: bool,
    pub parallel: bool,
    pub max_file_size_mb: Option<u32>,
}

impl Default for UnloadTuning {
    fn default() -> Self {
        Self {
            add_quotes: false,
            escape: false,
            allow_overwrite: false,
            parallel: true,
            max_file_size_mb: None,
        }
    }
}

/// Options for a single transfer. Borrowed immutably by every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferOptions {
    pub format: FileFormat,
    pub delimiter: char,
    pub quote: char,
    pub header: bool,
    pub null_as: Option<String>,
    pub compression: Compression,
    pub encryption: Encryption,
    /// Column subset and order for COPY, or names for a headerless read.
    pub columns: Option<Vec<String>>,
    /// File-name prefix appended to the UNLOAD destination.
    pub file_prefix: Option<String>,
    /// File-name suffix for UNLOAD parts (EXTENSION clause).
    pub file_suffix: Option<String>,
    pub manifest: bool,
    pub retain_staged: bool,
    pub credentials: Option<Credentials>,
    pub region: Option<String>,
    pub copy: CopyTuning,
    pub unload: UnloadTuning,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            format: FileFormat::Csv,
            delimiter: ',',
            quote: '"',
            header: true,
            null_as: None,
            compression: Compression::None,
            encryption: Encryption::None,
            columns: None,
            file_prefix: None,
            file_suffix: None,
            manifest: false,
            retain_staged: false,
            credentials: None,
            region: None,
            copy: CopyTuning::default(),
            unload: UnloadTuning::default(),
        }
    }
}

impl TransferOptions {
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn iam_role(arn: impl Into<String>) -> Self {
        Self::default().with_credentials(Credentials::IamRole { arn: arn.into() })
    }

    pub(crate) fn require_credentials(&self) -> Result<&Credentials> {
        self.credentials.as_ref().ok_or_else(|| {
            BridgeError::options("credentials are required: set an IAM role or an access key pair")
        })
    }

    fn validate_layout(&self) -> Result<()> {
        if !self.delimiter.is_ascii() || (self.delimiter.is_ascii_control() && self.delimiter != '\t') {
            return Err(BridgeError::options(format!(
                "delimiter must be a single printable ASCII character or tab, got {:?}",
                self.delimiter
            )));
        }
        if self.format == FileFormat::Csv {
            if !self.quote.is_ascii() || self.quote.is_ascii_control() {
                return Err(BridgeError::options(format!(
                    "quote must be a printable ASCII character, got {:?}",
                    self.quote
                )));
            }
            if self.quote == self.delimiter {
                return Err(BridgeError::options(
                    "delimiter and quote character must differ",
                ));
            }
        }
        Ok(())
    }

    fn validate_common(&self) -> Result<()> {
        self.validate_layout()?;
        if let Some(cols) = &self.columns {
            if cols.is_empty() {
                return Err(BridgeError::options("column list cannot be empty"));
            }
            let mut seen = HashSet::new();
            for c in cols {
                if c.is_empty() || !seen.insert(c.as_str()) {
                    return Err(BridgeError::options(format!(
                        "column list has an empty or repeated name: {:?}",
                        c
                    )));
                }
            }
        }
        let (Credentials::IamRole { arn: identity }
        | Credentials::AccessKey {
            access_key_id: identity,
            ..
        }) = self.require_credentials()?;
        if identity.is_empty() {
            return Err(BridgeError::options("credentials cannot be empty"));
        }
        Ok(())
    }

    /// Checks for COPY.
    pub fn validate_for_load(&self) -> Result<()> {
        self.validate_common()?;
        if self.format == FileFormat::Csv && (self.copy.escape || self.copy.remove_quotes) {
            return Err(BridgeError::options(
                "ESCAPE and REMOVEQUOTES cannot be combined with CSV",
            ));
        }
        if self.encryption != Encryption::None {
            return Err(BridgeError::options(
                "encryption applies to UNLOAD only; configure encryption on the staging bucket",
            ));
        }
        if self.manifest && self.header {
            return Err(BridgeError::options(
                "a COPY manifest lists data files; set header to false and describe the files instead",
            ));
        }
        if let Some(enc) = &self.copy.encoding {
            if !COPY_ENCODINGS.contains(&enc.to_ascii_uppercase().as_str()) {
                return Err(BridgeError::options(format!(
                    "unsupported COPY encoding {:?}, expected one of {}",
                    enc,
                    COPY_ENCODINGS.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Checks for UNLOAD.
    pub fn validate_for_unload(&self) -> Result<()> {
        self.validate_common()?;
        if self.compression == Compression::Lzop {
            return Err(BridgeError::options("UNLOAD does not support LZOP compression"));
        }
        if self.format == FileFormat::Csv && (self.unload.add_quotes || self.unload.escape) {
            return Err(BridgeError::options(
                "ADDQUOTES and ESCAPE cannot be combined with CSV on UNLOAD",
            ));
        }
        if let Encryption::SseKms { key_id } = &self.encryption {
            if key_id.is_empty() {
                return Err(BridgeError::options("KMS key id cannot be empty"));
            }
        }
        if let Some(0) = self.unload.max_file_size_mb {
            return Err(BridgeError::options("max_file_size_mb must be at least 1"));
        }
        Ok(())
    }

    /// Checks for parsing a staged file locally. Credentials are not needed.
    pub fn validate_for_read(&self, compression: Compression) -> Result<()> {
        if !compression.is_local() {
            return Err(BridgeError::options(format!(
                "{} files cannot be read locally",
                compression
            )));
        }
        self.validate_layout()
    }

    /// Null marker frames are staged with.
    pub fn staged_null(&self) -> &str {
        self.null_as.as_deref().unwrap_or(STAGED_NULL_MARKER)
    }

    /// Local file layout matching what COPY expects from a staged file.
    ///
    /// Only meaningful for options that passed validation; a non-ASCII
    /// delimiter or quote is replaced rather than truncated.
    pub fn staging_format(&self) -> DelimitedFormat {
        DelimitedFormat {
            null_as: Some(self.staged_null().to_string()),
            ..self.local_format()
        }
    }

    /// Layout for parsing a caller's local file: nulls are empty fields
    /// unless `null_as` says otherwise.
    pub fn local_format(&self) -> DelimitedFormat {
        DelimitedFormat {
            delimiter: ascii_byte(self.delimiter, b','),
            quote: match self.format {
                FileFormat::Csv => Some(ascii_byte(self.quote, b'"')),
                FileFormat::Delimited => None,
            },
            escape: None,
            header: self.header,
            null_as: self.null_as.clone(),
            columns: self.columns.clone(),
        }
    }

    /// Local file layout matching what UNLOAD produced.
    pub fn unloaded_format(&self) -> DelimitedFormat {
        let quote = match self.format {
            FileFormat::Csv => Some(b'"'),
            FileFormat::Delimited if self.unload.add_quotes => Some(b'"'),
            FileFormat::Delimited => None,
        };
        DelimitedFormat {
            quote,
            escape: self.unload.escape.then_some(b'\\'),
            ..self.local_format()
        }
    }
}

fn ascii_byte(c: char, fallback: u8) -> u8 {
    u8::try_from(c).ok().filter(u8::is_ascii).unwrap_or(fallback)
}

/// An object-store location, `s3://bucket/key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StagedLocation {
    pub bucket: String,
    pub key: String,
}

impl StagedLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Accepts `s3://bucket/key`, `s3a://bucket/key` or `bucket/key`.
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("s3://")
            .or_else(|| uri.strip_prefix("s3a://"))
            .unwrap_or(uri);
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(BridgeError::options(format!("no bucket in location {:?}", uri)));
        }
        Ok(Self::new(bucket, key))
    }

    /// Key prefix UNLOAD writes under. With a file prefix the key is treated
    /// as a folder.
    pub fn unload_prefix(&self, file_prefix: Option<&str>) -> String {
        match file_prefix {
            None => self.key.clone(),
            Some(p) if self.key.is_empty() || self.key.ends_with('/') => {
                format!("{}{}", self.key, p)
            }
            Some(p) => format!("{}/{}", self.key, p),
        }
    }

    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

impl fmt::Display for StagedLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}
