#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arch;
pub mod platform;
pub mod sdhci;
mod err;

pub use err::{CmdErrorKind, SdError};
