//! # Gateway Core
//!
//! Routing and upstream transport engine for an Ethereum JSON-RPC gateway.
//!
//! This crate provides:
//!
//! - **[`types`]**: the classified [`Call`](types::Call) and the error envelope.
//!
//! - **[`policy`]**: method and contract allow-lists, including recipient extraction from
//!   RLP-encoded raw transactions.
//!
//! - **[`upstream`]**: the two transports, request/response over HTTP with archival routing,
//!   and a multiplexed, self-reconnecting WebSocket stream.
//!
//! - **[`strategy`]**: naive, race and fallback routing across upstreams.
//!
//! - **[`runtime`]**: immutable running configuration snapshots and the hot-reload holder.
//!
//! - **[`proxy`]**: the [`Gateway`](proxy::Gateway) that turns one raw body into one response.
//!
//! - **[`config`]** and **[`metrics`]**: layered configuration loading and Prometheus metrics.
//!
//! ## Request Flow
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────┐
//! │ Call::parse │
//! └──────┬──────┘
//!        ▼
//! ┌─────────────┐
//! │   Policy    │ ─── Denied ──► Error Envelope
//! └──────┬──────┘
//!        │ Allowed (or limitation disabled)
//!        ▼
//! ┌─────────────┐
//! │  Strategy   │  NAIVE │ RACE │ FALLBACK
//! └──────┬──────┘
//!        │
//!    ┌───┴────────────┐
//!    ▼                ▼
//! HttpUpstream    StreamUpstream
//! (primary or     (one shared socket,
//!  archival)       correlation ids)
//!    │                │
//!    └───────┬────────┘
//!            ▼
//!   Response to Client
//! ```

pub mod config;
pub mod metrics;
pub mod policy;
pub mod proxy;
pub mod runtime;
pub mod strategy;
pub mod types;
pub mod upstream;
pub mod utils;
