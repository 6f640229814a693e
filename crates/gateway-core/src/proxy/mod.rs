//! Call boundary of the gateway.
//!
//! ```text
//! raw body ─► Call::parse ─► Policy (when enabled) ─► Strategy ─► upstream(s)
//!                                 │                       │
//!                                 └──── ProxyError ◄──────┘
//!                                          │
//!                                          ▼
//!                              {"jsonrpc":"2.0","id":..,"error":{..}}
//! ```

pub mod engine;
pub mod errors;

pub use engine::{Gateway, GatewayResponse};
pub use errors::ProxyError;
