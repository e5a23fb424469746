//! Email parsing: MIME decoding and attachment selection.

pub mod mime;
