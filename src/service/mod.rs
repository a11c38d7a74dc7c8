//! Stack Service Module
//!
//! The request/response layer on top of the registry. It is stateless per
//! call: resolve a key, perform one of Push, Peek, Pop or Sections, answer.
//!
//! ## Submodules
//! - **`stack_service`**: the shared contract every front end calls.
//! - **`headers`**: JSON encoding of header maps at the storage boundary.
//! - **`handlers`**: the plain HTTP (REST) front end on axum.
//! - **`protocol`**: REST routes and header names.
//! - **`types`**: messages and results exchanged with clients.

pub mod handlers;
pub mod headers;
pub mod protocol;
pub mod stack_service;
pub mod types;
