//! Minimal decoding of `eth_sendRawTransaction` payloads.
//!
//! Only the legacy layout is understood: a single RLP list of exactly seven items
//! `[nonce, gasPrice, gasLimit, to, value, data, signature]`. Nothing but the
//! recipient is interpreted.

use alloy_rlp::Header;
use thiserror::Error;

/// Number of items in the accepted transaction layout.
pub const TRANSACTION_FIELD_COUNT: usize = 7;

/// Position of the recipient address in the transaction list.
pub const RECIPIENT_FIELD: usize = 3;

#[derive(Debug, Error)]
pub enum RawTransactionError {
    #[error("raw transaction is missing the 0x prefix")]
    MissingPrefix,

    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("invalid rlp: {0}")]
    Rlp(alloy_rlp::Error),

    #[error("transaction is not an rlp list")]
    NotAList,

    #[error("{0} trailing bytes after transaction")]
    TrailingBytes(usize),

    #[error("expected {TRANSACTION_FIELD_COUNT} fields, found {0}")]
    FieldCount(usize),

    #[error("recipient field is not a byte string")]
    RecipientNotBytes,
}

impl From<alloy_rlp::Error> for RawTransactionError {
    fn from(err: alloy_rlp::Error) -> Self {
        Self::Rlp(err)
    }
}

/// One decoded list item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RlpItem<'a> {
    pub is_list: bool,
    pub payload: &'a [u8],
}

/// Splits an RLP-encoded list into its top-level items.
///
/// # Errors
///
/// Fails on malformed RLP, on a top-level string, or on bytes after the list.
pub fn decode_list(encoded: &[u8]) -> Result<Vec<RlpItem<'_>>, RawTransactionError> {
    let mut buf = encoded;
    let header = Header::decode(&mut buf)?;
    if !header.list {
        return Err(RawTransactionError::NotAList);
    }

    let mut payload = take(&mut buf, header.payload_length)?;
    if !buf.is_empty() {
        return Err(RawTransactionError::TrailingBytes(buf.len()));
    }

    let mut items = Vec::with_capacity(TRANSACTION_FIELD_COUNT);
    while !payload.is_empty() {
        let item = Header::decode(&mut payload)?;
        items.push(RlpItem { is_list: item.list, payload: take(&mut payload, item.payload_length)? });
    }

    Ok(items)
}

fn take<'a>(buf: &mut &'a [u8], len: usize) -> Result<&'a [u8], RawTransactionError> {
    if buf.len() < len {
        return Err(alloy_rlp::Error::InputTooShort.into());
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

/// Decodes a `0x`-prefixed raw transaction and returns its recipient as
/// lower-case `0x`-prefixed hex.
///
/// # Errors
///
/// Returns a [`RawTransactionError`] describing the first decoding failure.
pub fn recipient(raw_hex: &str) -> Result<String, RawTransactionError> {
    let digits = raw_hex
        .strip_prefix("0x")
        .or_else(|| raw_hex.strip_prefix("0X"))
        .ok_or(RawTransactionError::MissingPrefix)?;
    let encoded = hex::decode(digits)?;

    let items = decode_list(&encoded)?;
    if items.len() != TRANSACTION_FIELD_COUNT {
        return Err(RawTransactionError::FieldCount(items.len()));
    }

    let to = items[RECIPIENT_FIELD];
    if to.is_list {
        return Err(RawTransactionError::RecipientNotBytes);
    }

    Ok(format!("0x{}", hex::encode(to.payload)))
}
