//! bookend - wrap videos with still-image intros and outros.
//!
//! The engine prefers a remux+concat fast path that never re-encodes
//! the source, and falls back to a single-pass re-encode when the fast
//! path is structurally impossible.

pub mod config;
pub mod engine;
