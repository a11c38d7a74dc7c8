//! Durable Named Stack Store Library
//!
//! This library crate defines the modules behind the `stackdbd` daemon and the
//! `stackdb-cli` client.
//!
//! ## Architecture Modules
//! - **`storage`**: The stack layer. Maps arbitrary keys to file-backed LIFO
//!   stacks under one root directory, opens them lazily, closes idle ones in the
//!   background and recovers existing files at startup.
//! - **`service`**: The operation contract (Push, Peek, Pop, Sections) and its
//!   plain HTTP (REST) front end.
//! - **`rpc`**: The same contract as a binary RPC service, served over raw TCP
//!   or carried over HTTP, plus the typed client used by the CLI.
//! - **`config`**: Daemon options from flags and environment.
//! - **`error`**: The error type shared by the stack and service layers.

pub mod config;
pub mod error;
pub mod rpc;
pub mod service;
pub mod storage;
