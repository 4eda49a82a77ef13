//! gpg invocation: process launching, buffered and streaming invokers.

mod buffered;
mod error;
mod guard;
mod launcher;
mod pipe;
mod streaming;

pub use buffered::*;
pub use error::*;
pub use guard::*;
pub use launcher::*;
pub use streaming::*;
