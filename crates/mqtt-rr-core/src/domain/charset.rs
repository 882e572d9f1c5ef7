//! Payload character sets.
//!
//! Inbound payloads arrive as raw bytes; the dispatcher decodes them once,
//! before correlation, using the configured charset.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Character encoding used to decode inbound payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Charset {
    /// UTF-8; malformed sequences are replaced with U+FFFD.
    #[default]
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    /// ISO-8859-1 (Latin-1): every byte maps to the code point of the same value.
    #[serde(rename = "iso-8859-1", alias = "latin1")]
    Iso8859_1,
    /// 7-bit ASCII; bytes above 0x7F become U+FFFD.
    #[serde(rename = "us-ascii", alias = "ascii")]
    UsAscii,
}

impl Charset {
    /// Decode raw payload bytes into a string.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Charset::Iso8859_1 => bytes.iter().map(|&b| b as char).collect(),
            Charset::UsAscii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
                .collect(),
        }
    }

    /// Canonical label.
    pub fn label(&self) -> &'static str {
        match self {
            Charset::Utf8 => "utf-8",
            Charset::Iso8859_1 => "iso-8859-1",
            Charset::UsAscii => "us-ascii",
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Charset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Charset::Utf8),
            "iso-8859-1" | "latin1" | "latin-1" => Ok(Charset::Iso8859_1),
            "us-ascii" | "ascii" => Ok(Charset::UsAscii),
            other => Err(format!("unsupported charset: {other}")),
        }
    }
}
