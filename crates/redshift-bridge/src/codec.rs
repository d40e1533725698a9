//! Compression codecs for staged files.

use std::fmt;
use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Compression applied to staged or unloaded files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Bzip2,
    Zstd,
    Lzop,
}

impl Compression {
    /// COPY/UNLOAD keyword, if any.
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some("GZIP"),
            Compression::Bzip2 => Some("BZIP2"),
            Compression::Zstd => Some("ZSTD"),
            Compression::Lzop => Some("LZOP"),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Gzip => ".gz",
            Compression::Bzip2 => ".bz2",
            Compression::Zstd => ".zst",
            Compression::Lzop => ".lzo",
        }
    }

    /// Whether this process can compress and decompress the codec itself.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Compression::None | Compression::Gzip | Compression::Zstd
        )
    }

    pub fn encode(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data),
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(&data)?;
                Ok(encoder.finish()?)
            }
            Compression::Zstd => Ok(zstd::encode_all(data.as_slice(), 3)?),
            other => Err(BridgeError::options(format!(
                "{} files can be loaded by the warehouse but not produced locally",
                other
            ))),
        }
    }

    pub fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Gzip => {
                let mut out = Vec::new();
                GzDecoder::new(data).read_to_end(&mut out)?;
                Ok(out)
            }
            Compression::Zstd => Ok(zstd::decode_all(data)?),
            other => Err(BridgeError::options(format!(
                "{} files cannot be read locally",
                other
            ))),
        }
    }

    /// Guess the codec from an object key's extension.
    pub fn from_key(key: &str) -> Self {
        if key.ends_with(".gz") {
            Compression::Gzip
        } else if key.ends_with(".bz2") {
            Compression::Bzip2
        } else if key.ends_with(".zst") {
            Compression::Zstd
        } else if key.ends_with(".lzo") {
            Compression::Lzop
        } else {
            Compression::None
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword().unwrap_or("uncompressed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_and_zstd_round_trip() {
        let data = b"a,b\n1,2\n".to_vec();
        for codec in [Compression::None, Compression::Gzip, Compression::Zstd] {
            let packed = codec.encode(data.clone()).unwrap();
            assert_eq!(codec.decode(&packed).unwrap(), data, "{}", codec);
        }
    }

    #[test]
    fn test_remote_only_codecs() {
        assert!(Compression::Bzip2.encode(vec![1]).is_err());
        assert!(Compression::Lzop.decode(&[1]).is_err());
        assert!(!Compression::Bzip2.is_local());
    }

    #[test]
    fn test_from_key() {
        assert_eq!(Compression::from_key("a/0000_part_00.gz"), Compression::Gzip);
        assert_eq!(Compression::from_key("a/0000_part_00"), Compression::None);
        assert_eq!(Compression::from_key("x.zst"), Compression::Zstd);
    }
}
