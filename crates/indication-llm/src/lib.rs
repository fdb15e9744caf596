//! Completion-service wrapper for indication mapping.
//!
//! This crate owns the contract with the external language model: the request
//! and response shapes, the fixed ICD-10 mapping prompts, an Anthropic
//! Messages API client, and a parser for the JSON document the model is asked
//! to produce.

pub mod client;
pub mod extraction;
pub mod prompts;

pub use client::*;
pub use extraction::*;
pub use prompts::*;
