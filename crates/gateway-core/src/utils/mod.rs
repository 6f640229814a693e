//! Parsing helpers shared across the gateway.
//!
//! ## Block Parameter Parsing (`block_param`)
//! - Block tags (`latest`, `finalized`, ...) and base-prefixed integers
//! - JSON parameter shapes used by the archival classifier

pub mod block_param;

pub use block_param::{BlockParameter, BlockRef, BlockTag, ParseError as BlockParseError};
