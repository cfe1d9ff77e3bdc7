//! Repository metadata: the `repomd.xml` index and the files it lists.

mod fetcher;
mod index;

pub use fetcher::{MetadataFetcher, MetadataSummary};
pub use index::{MetadataEntry, RepoIndex, PRIMARY_KIND};
