//! Method and contract access policy.
//!
//! A [`Policy`] is built once per running configuration from two static allow-lists
//! and is read-only afterwards, so any number of concurrent requests may consult it
//! without synchronization.
//!
//! # Validation order
//!
//! 1. The method must be in the method allow-list.
//! 2. `eth_getBalance` and `eth_getTransactionReceipt` pass unconditionally.
//! 3. `eth_call` and `eth_estimateGas` must target a whitelisted `to` address.
//! 4. `eth_sendRawTransaction` must decode to a legacy transaction whose recipient
//!    is whitelisted.
//! 5. Every other allowed method passes.
//!
//! Any malformed parameter on steps 3 and 4 is reported as
//! [`PolicyError::DecodeError`].

pub mod raw_transaction;

use crate::types::Call;
use ahash::AHashSet;
use serde_json::Value;
use tracing::debug;

/// Outcome of a failed policy check. Never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("not allowed method")]
    DeniedMethod,

    #[error("not allowed contract or address")]
    DeniedContract,

    /// The payload of a policy-sensitive method could not be interpreted.
    #[error("decode error")]
    DecodeError,
}

impl PolicyError {
    /// Short label used for metrics.
    #[must_use]
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::DeniedMethod => "denied_method",
            Self::DeniedContract => "denied_contract",
            Self::DecodeError => "decode_error",
        }
    }
}

/// Static method and contract allow-lists.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    allowed_methods: AHashSet<String>,
    allowed_contracts: AHashSet<String>,
}

impl Policy {
    /// Builds a policy. Method names are matched exactly; contract addresses are
    /// stored lower-cased.
    pub fn new<M, C>(methods: M, contracts: C) -> Self
    where
        M: IntoIterator,
        M::Item: Into<String>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        Self {
            allowed_methods: methods.into_iter().map(Into::into).collect(),
            allowed_contracts: contracts
                .into_iter()
                .map(|address| address.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    #[must_use]
    pub fn is_allowed(&self, method: &str) -> bool {
        self.allowed_methods.contains(method)
    }

    /// Case-insensitive membership test against the contract allow-list.
    #[must_use]
    pub fn in_whitelist(&self, address: &str) -> bool {
        self.allowed_contracts.contains(&address.to_ascii_lowercase())
    }

    /// Validates a call against both allow-lists.
    ///
    /// # Errors
    ///
    /// - [`PolicyError::DeniedMethod`] if the method is not allowed
    /// - [`PolicyError::DeniedContract`] if the target address is not whitelisted
    /// - [`PolicyError::DecodeError`] if the parameters cannot be interpreted
    pub fn validate(&self, call: &Call) -> Result<(), PolicyError> {
        if !self.is_allowed(&call.method) {
            return Err(PolicyError::DeniedMethod);
        }

        match call.method.as_str() {
            "eth_getBalance" | "eth_getTransactionReceipt" => Ok(()),
            "eth_call" | "eth_estimateGas" => {
                let to = call
                    .params
                    .first()
                    .and_then(|tx| tx.get("to"))
                    .and_then(Value::as_str)
                    .ok_or(PolicyError::DecodeError)?;
                self.check_contract(to)
            }
            "eth_sendRawTransaction" => {
                let payload =
                    call.params.first().and_then(Value::as_str).ok_or(PolicyError::DecodeError)?;
                let recipient = raw_transaction::recipient(payload).map_err(|e| {
                    debug!(error = %e, "raw transaction rejected");
                    PolicyError::DecodeError
                })?;
                self.check_contract(&recipient)
            }
            _ => Ok(()),
        }
    }

    fn check_contract(&self, address: &str) -> Result<(), PolicyError> {
        if self.in_whitelist(address) {
            Ok(())
        } else {
            Err(PolicyError::DeniedContract)
        }
    }
}
