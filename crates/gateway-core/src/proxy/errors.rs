use crate::{policy::PolicyError, strategy::StrategyError};

/// Failure of one call at the gateway boundary.
///
/// The display string is the `message` of the error envelope returned to the
/// caller.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Strategy(#[from] StrategyError),
}
