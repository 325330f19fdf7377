//! Core data models for the resumable upload service.
//!
//! `chunk` holds the validated identifiers that map onto disk paths;
//! `upload` holds the JSON bodies exchanged with the browser client.

pub mod chunk;
pub mod upload;
