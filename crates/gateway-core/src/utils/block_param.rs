//! Block parameter parsing shared by the archival classifier and the block-height
//! refresher.

use serde_json::Value;
use thiserror::Error;

/// Error types for block parameter parsing
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    #[error("invalid number: {0}")]
    InvalidNumber(String),
}

/// Block reference types supported by Ethereum JSON-RPC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRef {
    /// Specific block number
    Number(u64),
    /// Block tag (latest, earliest, etc.)
    Tag(BlockTag),
}

/// Standard Ethereum block tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Earliest,
    Pending,
    Safe,
    Finalized,
}

pub struct BlockParameter;

impl BlockParameter {
    /// Parses a block parameter string: a tag, or an integer with an optional base
    /// prefix (`0x` hex, `0o` octal, `0b` binary, otherwise decimal).
    ///
    /// # Examples
    /// ```
    /// use gateway_core::utils::block_param::{BlockParameter, BlockRef, BlockTag};
    ///
    /// assert_eq!(BlockParameter::parse("latest").unwrap(), BlockRef::Tag(BlockTag::Latest));
    /// assert_eq!(BlockParameter::parse("0x10").unwrap(), BlockRef::Number(16));
    /// assert_eq!(BlockParameter::parse("100").unwrap(), BlockRef::Number(100));
    /// ```
    ///
    /// # Errors
    /// Returns `ParseError` if the input is neither a tag nor an integer.
    pub fn parse(param: &str) -> Result<BlockRef, ParseError> {
        match param {
            "latest" => Ok(BlockRef::Tag(BlockTag::Latest)),
            "pending" => Ok(BlockRef::Tag(BlockTag::Pending)),
            "earliest" => Ok(BlockRef::Tag(BlockTag::Earliest)),
            "safe" => Ok(BlockRef::Tag(BlockTag::Safe)),
            "finalized" => Ok(BlockRef::Tag(BlockTag::Finalized)),
            s => Self::parse_prefixed(s).map(BlockRef::Number),
        }
    }

    /// Parses an integer literal whose base is selected by its prefix.
    ///
    /// # Errors
    /// Returns `ParseError::InvalidHex` for a malformed `0x` literal and
    /// `ParseError::InvalidNumber` for anything else that does not parse.
    pub fn parse_prefixed(s: &str) -> Result<u64, ParseError> {
        let (digits, radix) = match s.get(..2) {
            Some("0x" | "0X") => (&s[2..], 16),
            Some("0o" | "0O") => (&s[2..], 8),
            Some("0b" | "0B") => (&s[2..], 2),
            _ => (s, 10),
        };

        u64::from_str_radix(digits, radix).map_err(|_| {
            if radix == 16 {
                ParseError::InvalidHex(s.to_string())
            } else {
                ParseError::InvalidNumber(s.to_string())
            }
        })
    }

    /// Extracts a concrete block number from a call parameter.
    ///
    /// Strings go through [`parse`](Self::parse), where tags yield `None`.
    /// Non-negative JSON numbers are truncated to an integer. Every other shape
    /// yields `None`.
    #[must_use]
    pub fn from_param(value: &Value) -> Option<u64> {
        match value {
            Value::String(s) => match Self::parse(s) {
                Ok(BlockRef::Number(n)) => Some(n),
                _ => None,
            },
            Value::Number(n) => n.as_u64().or_else(|| {
                n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f.trunc() as u64)
            }),
            _ => None,
        }
    }

    /// Reads the `result` of an `eth_blockNumber` response body.
    #[must_use]
    pub fn from_block_number_response(body: &[u8]) -> Option<u64> {
        let response: Value = serde_json::from_slice(body).ok()?;
        response.get("result").and_then(Value::as_str).and_then(|s| Self::parse_prefixed(s).ok())
    }
}
