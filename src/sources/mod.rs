//! Package sources.
//!
//! Remote git access, the content-addressed cache, and the fetcher that
//! ties them together.

pub mod cache;
pub mod git;
pub mod remote;

pub use cache::{CacheKey, ContentStore, FsStore, MemoryStore, PackageTree};
pub use git::{GitFetcher, ResolvedRef, RetryPolicy};
pub use remote::{Git2Remote, GitRemote, RemoteRef};
