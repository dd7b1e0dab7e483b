//! Shared persistence primitives for Holdfast.
//!
//! Every durable store in the workspace is built from three leaf pieces:
//!
//! - [`framing`] -- length-prefixed byte records with a corrupt-tail
//!   detection scan (a torn trailing write is detected, never surfaced as
//!   an error)
//! - [`codec`] -- the [`GuardedCodec`] serialization wrapper that funnels
//!   all snapshot encode/decode calls through one internal lock
//! - [`paths`] -- the main/`.bak`/`.tmp` file triple with atomic publish,
//!   backup rotation and self-heal helpers
//!
//! # Design Rules
//!
//! 1. A reader never observes a half-published file: new content becomes
//!    current only via a single rename.
//! 2. A torn tail is repaired by truncation, not reported as a failure.
//! 3. The codec lock is private to [`GuardedCodec`] and is only ever taken
//!    while a store-instance lock is already held, so the lock order is
//!    fixed by construction.

pub mod codec;
pub mod error;
pub mod framing;
pub mod paths;

pub use codec::GuardedCodec;
pub use error::{CoreError, CoreResult};
pub use framing::{Record, ScanOutcome, HEADER_SIZE};
pub use paths::StorePaths;
