//! Durable Stack Storage Module
//!
//! Multiplexes many named, file-backed LIFO stacks through one process while
//! bounding how many files are open at a time.
//!
//! ## Core Concepts
//! - **Key codec**: section keys are percent-encoded into single file names in one flat root directory.
//! - **File stack**: one open LIFO bound to one file (`header | body | footer` records).
//! - **Registry**: owns every handle. Opens lazily, evicts idle handles in the background,
//!   reopens them on demand and recovers existing stacks with a startup scan.

pub mod codec;
pub mod file_stack;
pub mod registry;
pub mod section;
pub mod types;

#[cfg(test)]
mod tests;
