//! gpg-shim - Drive gpg as a subprocess in buffered and streaming modes.

pub mod config;
pub mod gpg;
