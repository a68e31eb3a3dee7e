// Core wrap engine - independent of any front-end

pub mod core;
pub mod env;
pub mod probe;
pub mod worker;

pub use core::*;
pub use env::BinaryEnvironment;
pub use probe::{ProbeResult, probe_media};
pub use worker::JobEngine;
