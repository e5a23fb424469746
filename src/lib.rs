//! `mailharvest` — pull mailed build artifacts out of an IMAP folder.
//!
//! This crate provides the library behind the CLI: a mail session, MIME
//! attachment selection, extension-based routing, and zip distribution into
//! a destination tree.

pub mod archive;
pub mod config;
pub mod error;
pub mod ingest;
pub mod mail;
pub mod model;
pub mod parser;
pub mod router;
