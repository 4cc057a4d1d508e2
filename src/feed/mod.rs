//! Feed synchronization: page cache, load orchestration, repost chains,
//! and mutation propagation.
//!
//! The module is organized around one shared [`store::PageStore`]:
//!
//! - [`sync`] - demand-driven page fetching with in-flight and staleness guards
//! - [`chain`] - bounded repost-chain walk and per-level image ownership
//! - [`mutation`] - in-place patching of toggle results into cached items
//! - [`fetcher`] - collaborator contracts and their HTTP implementations

pub mod chain;
pub mod fetcher;
pub mod mutation;
pub mod store;
pub mod sync;

pub use chain::{build_chain, node_role, owned_images, ChainNodeRole, MAX_CHAIN_DEPTH};
pub use fetcher::{HttpClient, MutationExecutor, PageFetcher, UnreadStatusFetcher};
pub use mutation::{apply_collect, apply_like, MutationPropagator};
pub use store::{PageStore, SharedPageStore};
pub use sync::{FeedSynchronizer, LoadOutcome, LoadPhase};
