//! Domain managers over the Holdfast stores.
//!
//! Each manager owns one store instance and translates domain operations
//! (toggle favorite, set rating, whitelist a dependency, cache a
//! thumbnail) into store operations. The manager layer is the absorption
//! boundary for storage faults: no error from the persistence layer
//! propagates into the host's control flow -- every public operation
//! catches internally, logs a diagnostic, and degrades to a safe default
//! (empty state, skipped save, stale-cache miss). Losing one session's
//! incremental state is always preferable to faulting a long-running
//! interactive process.
//!
//! The [`Session`] is the composition root: it constructs every store once
//! with an explicit open/close lifecycle and hands the managers out.

pub mod error;
pub mod favorites;
pub mod notify;
pub mod packlist;
pub mod ratings;
pub mod session;
pub mod thumbs;

pub use error::{ManagerError, ManagerResult};
pub use favorites::FavoritesManager;
pub use notify::{ChangeEvent, ChangeRouter, Domain};
pub use packlist::PackListManager;
pub use ratings::RatingsManager;
pub use session::Session;
pub use thumbs::{Thumbnail, ThumbnailCache};
