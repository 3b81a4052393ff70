//! Source archive creation for fndeploy.
//!
//! # Archive strategy
//!
//! The archive mirrors the function's source directory:
//! - Every regular file under the source root is zipped with a `/`-separated
//!   path relative to that root
//! - `.gcloudignore` at the source root excludes matching paths (see [`ignore`])
//! - An ignored directory is pruned as a whole
//! - The output zip is never added to itself, even when it lives in the tree
//!
//! Archives are written to a unique file in the system temp directory by
//! default and removed by the caller once the upload finishes.

pub mod archive;
pub mod ignore;

pub use archive::{
    ArchiveEntry, ArchiveError, ArchiveOptions, ArchiveSummary, build_archive, remove_archive,
    temp_archive_path,
};
pub use ignore::IgnoreRules;
