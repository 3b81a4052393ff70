use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::ZipWriter;
use zip::write::FileOptions;

use crate::ignore::IgnoreRules;

/// A single entry visited while building an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveEntry<'a> {
    /// Written into the archive (path relative to the source root).
    Included(&'a str),
    /// Skipped by an ignore rule. Ignored directories are reported once and
    /// not descended into.
    Excluded(&'a str),
}

/// Caller-supplied options for [`build_archive`].
#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
    /// Patterns applied after the source root's `.gcloudignore`.
    pub extra_ignores: Vec<String>,
}

/// Result of a successful [`build_archive`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub files: usize,
    pub excluded: usize,
    pub bytes: u64,
}

/// Zip `source_dir` into `output`, honouring `.gcloudignore`.
///
/// Paths inside the archive are relative to `source_dir` and always use `/`.
/// `on_entry` is called for every included file and every excluded path.
pub fn build_archive(
    source_dir: &Path,
    output: &Path,
    options: &ArchiveOptions,
    on_entry: &mut dyn FnMut(ArchiveEntry<'_>),
) -> Result<ArchiveSummary, ArchiveError> {
    if !source_dir.is_dir() {
        return Err(ArchiveError::SourceNotFound(source_dir.to_path_buf()));
    }

    let mut rules = IgnoreRules::load(source_dir)?;
    for pattern in &options.extra_ignores {
        rules.push(pattern)?;
    }

    let file = File::create(output).map_err(|e| ArchiveError::CreateOutput {
        path: output.to_path_buf(),
        source: e,
    })?;

    match write_archive(file, source_dir, output, &rules, on_entry) {
        Ok(summary) => {
            tracing::info!(
                path = %output.display(),
                files = summary.files,
                excluded = summary.excluded,
                bytes = summary.bytes,
                "function source zipfile created"
            );
            Ok(summary)
        }
        Err(e) => {
            if let Err(cleanup) = remove_archive(output) {
                tracing::warn!(
                    path = %output.display(),
                    error = %cleanup,
                    "failed to remove partial archive"
                );
            }
            Err(e)
        }
    }
}

fn write_archive(
    file: File,
    source_dir: &Path,
    output: &Path,
    rules: &IgnoreRules,
    on_entry: &mut dyn FnMut(ArchiveEntry<'_>),
) -> Result<ArchiveSummary, ArchiveError> {
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let file_options =
        FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);

    // The output may live inside the source tree; never archive it into itself.
    let output_abs = output.canonicalize().map_err(|e| ArchiveError::CreateOutput {
        path: output.to_path_buf(),
        source: e,
    })?;

    let mut files = 0;
    let mut excluded = 0;

    let mut walker = WalkDir::new(source_dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| ArchiveError::Walk { source: e })?;
        let relative = relative_name(source_dir, entry.path());
        let is_dir = entry.file_type().is_dir();

        if rules.is_ignored(&relative, is_dir) {
            tracing::debug!(path = %relative, "excluding from archive");
            on_entry(ArchiveEntry::Excluded(&relative));
            excluded += 1;
            if is_dir {
                walker.skip_current_dir();
            }
            continue;
        }

        if is_dir {
            continue;
        }

        // Links are not followed into directories, and dangling links carry no content.
        if entry.file_type().is_symlink() {
            match std::fs::metadata(entry.path()) {
                Ok(target) if target.is_dir() => {
                    tracing::debug!(path = %relative, "skipping symlink to directory");
                    on_entry(ArchiveEntry::Excluded(&relative));
                    excluded += 1;
                    continue;
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(path = %relative, "skipping dangling symlink");
                    on_entry(ArchiveEntry::Excluded(&relative));
                    excluded += 1;
                    continue;
                }
                Err(e) => {
                    return Err(ArchiveError::ReadFile {
                        path: entry.path().to_path_buf(),
                        source: e,
                    });
                }
            }
        }

        if entry
            .path()
            .canonicalize()
            .is_ok_and(|p| p == output_abs)
        {
            continue;
        }

        let mut src = File::open(entry.path()).map_err(|e| ArchiveError::ReadFile {
            path: entry.path().to_path_buf(),
            source: e,
        })?;
        zip.start_file(relative.as_str(), file_options)
            .map_err(|e| ArchiveError::Zip { source: e })?;
        std::io::copy(&mut src, &mut zip).map_err(|e| ArchiveError::ReadFile {
            path: entry.path().to_path_buf(),
            source: e,
        })?;

        on_entry(ArchiveEntry::Included(&relative));
        files += 1;
    }

    zip.finish().map_err(|e| ArchiveError::Zip { source: e })?;

    let bytes = std::fs::metadata(output)
        .map_err(|e| ArchiveError::CreateOutput {
            path: output.to_path_buf(),
            source: e,
        })?
        .len();

    Ok(ArchiveSummary {
        path: output.to_path_buf(),
        files,
        excluded,
        bytes,
    })
}

/// A fresh, collision-free archive path in the system temp directory.
pub fn temp_archive_path() -> PathBuf {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    std::env::temp_dir().join(format!("cfsrc-{suffix}.zip"))
}

/// Delete an archive; a file that is already gone counts as removed.
pub fn remove_archive(path: &Path) -> Result<(), ArchiveError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "archive already removed");
            Ok(())
        }
        Err(e) => Err(ArchiveError::Remove {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn relative_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("unable to find source directory {0}")]
    SourceNotFound(PathBuf),
    #[error("failed to read ignore file {path}")]
    ReadIgnoreFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid ignore pattern '{pattern}'")]
    InvalidIgnorePattern {
        pattern: String,
        source: glob::PatternError,
    },
    #[error("failed to walk source directory")]
    Walk { source: walkdir::Error },
    #[error("failed to create archive {path}")]
    CreateOutput {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read file {path}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write zip archive")]
    Zip { source: zip::result::ZipError },
    #[error("failed to remove archive {path}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },
}
