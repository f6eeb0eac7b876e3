//! Graft Resolver: forward-sync and the per-kind resolution strategies
//!
//! Each classified import is handed to exactly one strategy. Eager strategies
//! materialize files during the traversal and return the next frontier;
//! deferred ones collect requests and run once at the end of a build.

pub mod sync;
pub mod host;
pub mod context;
pub mod app;
pub mod addon;
pub mod fallback;
pub mod deferred;
pub mod registry;


pub use sync::{FsSyncer, SyncMode, SyncRequest, Syncer, forward_sync};
pub use context::{Frontier, ResolveContext};
pub use app::AppResolver;
pub use addon::AddonResolver;
pub use fallback::FallbackResolver;
pub use deferred::{Bundler, DeferredResolver, MainEntryBundler};
pub use registry::{Resolver, ResolverKey, ResolverRegistry, Stage};
