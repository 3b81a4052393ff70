use std::path::Path;

use fndeploy_build::ArchiveEntry;

/// Progress hooks for a deploy. Every method defaults to a no-op.
pub trait DeployObserver {
    /// The source archive is about to be written.
    fn on_zip(&mut self, _source_dir: &Path, _archive: &Path) {}

    /// A path was added to or left out of the archive.
    fn on_entry(&mut self, _entry: ArchiveEntry<'_>) {}

    /// Called before each operation fetch, with the 1-based attempt number.
    fn on_poll(&mut self, _attempt: u32) {}

    /// The function does not exist yet and will be created.
    fn on_new(&mut self) {}

    /// The function exists and will be patched.
    fn on_existing(&mut self) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl DeployObserver for NoopObserver {}
