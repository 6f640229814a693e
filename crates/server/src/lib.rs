//! Front door for the JSON-RPC gateway: the axum router and its handlers.

pub mod router;
