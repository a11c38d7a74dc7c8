//! Binary RPC Module
//!
//! Exposes the stack service as named calls (`Push`, `Peek`, `Pop`,
//! `Sections`) on the `db` service, over raw TCP or wrapped in HTTP.
//!
//! ## Submodules
//! - **`protocol`**: request/response types and length-prefixed bincode framing.
//! - **`server`**: TCP accept loop and the dispatcher shared by both transports.
//! - **`http`**: the RPC-over-HTTP endpoint on axum.
//! - **`client`**: typed client used by `stackdb-cli`.

pub mod client;
pub mod http;
pub mod protocol;
pub mod server;
