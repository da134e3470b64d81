//! Secure extraction of `base64(gzip(tar))` payloads.
//!
//! # Invariants
//! - Every entry name is checked before anything is written for it. A name
//!   that is empty, absolute, or climbs above the root with `..` aborts the
//!   whole unpack with [`UnpackError::PathTraversal`].
//! - Only directories and regular files are materialized. Symlinks,
//!   hardlinks, device nodes and FIFOs are skipped without error, so no
//!   entry can redirect a later write outside the destination.
//! - Directory modes from the archive are ignored; directories get
//!   [`DIR_MODE`].
//! - File modes keep their declared permission bits; setuid, setgid and
//!   sticky are dropped.
//! - An entry that collides with an earlier one of a different kind (a file
//!   where a directory exists, or a path through a file) is an
//!   [`UnpackError::ArchiveFormat`] error.
//! - Payloads are streamed to disk; an entry is never held in memory whole.
//!
//! Entries written before a failure are left in place. The caller owns the
//! destination and is expected to discard it (see [`crate::workspace`]).

use std::borrow::Cow;
use std::cell::Cell;
use std::fs::{self, DirBuilder, OpenOptions, Permissions};
use std::io::{self, Read};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};

use base64::Engine;
use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::UnpackError;

/// Mode for every directory created while unpacking.
pub const DIR_MODE: u32 = 0o755;

/// Permission bits a regular file may carry.
const FILE_MODE_MASK: u32 = 0o777;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Budgets applied while unpacking a single archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveLimits {
    /// Maximum number of tar entries of any kind.
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,

    /// Maximum total payload bytes written across all files.
    #[serde(default = "default_max_unpacked_bytes")]
    pub max_unpacked_bytes: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_unpacked_bytes: default_max_unpacked_bytes(),
        }
    }
}

const fn default_max_entries() -> u64 {
    100_000
}

const fn default_max_unpacked_bytes() -> u64 {
    1024 * 1024 * 1024
}

/// Kind of a tar entry, as far as the unpacker cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Created with [`DIR_MODE`].
    Directory,
    /// Created with the (clamped) declared mode and its payload.
    RegularFile,
    /// Symlinks, hardlinks, devices, FIFOs, metadata records. Never written.
    Other,
}

impl From<tar::EntryType> for EntryKind {
    fn from(kind: tar::EntryType) -> Self {
        if kind.is_dir() {
            Self::Directory
        } else if kind.is_file() {
            Self::RegularFile
        } else {
            Self::Other
        }
    }
}

/// Counters describing a completed unpack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnpackSummary {
    /// Regular files written.
    pub files: u64,
    /// Directory entries honored.
    pub directories: u64,
    /// Entries of other kinds that were not materialized.
    pub skipped: u64,
    /// Total payload bytes written.
    pub bytes: u64,
}

/// Unpack `encoded` into `dest` with the default [`ArchiveLimits`].
pub fn unpack(encoded: &str, dest: &Path) -> Result<UnpackSummary, UnpackError> {
    unpack_with_limits(encoded, dest, &ArchiveLimits::default())
}

/// Decode, decompress and extract `encoded` into the existing directory `dest`.
pub fn unpack_with_limits(
    encoded: &str,
    dest: &Path,
    limits: &ArchiveLimits,
) -> Result<UnpackSummary, UnpackError> {
    let compressed = decode(encoded)?;
    if !compressed.starts_with(&GZIP_MAGIC) {
        return Err(UnpackError::Decompression("missing gzip header".into()));
    }

    let inflate_failed = Cell::new(false);
    let mut inflater = Inflater {
        inner: MultiGzDecoder::new(compressed.as_slice()),
        failed: &inflate_failed,
    };
    let mut archive = tar::Archive::new(&mut inflater);

    let stream_error = |e: io::Error| {
        if inflate_failed.get() {
            UnpackError::Decompression(e.to_string())
        } else {
            UnpackError::ArchiveFormat(e.to_string())
        }
    };

    let mut summary = UnpackSummary::default();
    let mut entries_seen: u64 = 0;

    for entry in archive.entries().map_err(stream_error)? {
        let mut entry = entry.map_err(stream_error)?;

        entries_seen += 1;
        if entries_seen > limits.max_entries {
            return Err(UnpackError::LimitExceeded {
                limit: "entry count",
                max: limits.max_entries,
            });
        }

        let name = entry.path().map_err(stream_error)?.into_owned();
        let relative = local_path(&name).ok_or_else(|| UnpackError::PathTraversal {
            name: name.display().to_string(),
        })?;
        let target = dest.join(&relative);
        let kind = EntryKind::from(entry.header().entry_type());

        if kind != EntryKind::Other {
            if let Some(reason) = conflict(dest, &relative, kind) {
                return Err(UnpackError::ArchiveFormat(format!(
                    "entry {}: {reason}",
                    name.display()
                )));
            }
        }

        match kind {
            EntryKind::Directory => {
                create_dirs(&target)?;
                summary.directories += 1;
            }
            EntryKind::RegularFile => {
                let declared = entry.header().mode().map_err(stream_error)?;
                let budget = limits.max_unpacked_bytes.saturating_sub(summary.bytes);
                let written = write_file(&mut entry, &target, clamp_mode(declared), budget)
                    .map_err(|e| match e {
                        WriteError::Read(e) => stream_error(e),
                        WriteError::Write(e) => UnpackError::io(&target, e),
                        WriteError::OverBudget => UnpackError::LimitExceeded {
                            limit: "unpacked size",
                            max: limits.max_unpacked_bytes,
                        },
                    })?;
                summary.files += 1;
                summary.bytes += written;
            }
            EntryKind::Other => {
                // Links and special files are never materialized.
                debug!(
                    entry = %name.display(),
                    kind = ?entry.header().entry_type(),
                    "skipping non-regular archive entry"
                );
                summary.skipped += 1;
            }
        }
    }

    Ok(summary)
}

/// Base64-decode, tolerating line breaks in the transport encoding.
fn decode(encoded: &str) -> Result<Vec<u8>, UnpackError> {
    let compact: Cow<'_, str> = if encoded.contains(['\r', '\n']) {
        Cow::Owned(encoded.replace(['\r', '\n'], ""))
    } else {
        Cow::Borrowed(encoded)
    };
    Ok(base64::engine::general_purpose::STANDARD.decode(compact.as_bytes())?)
}

/// Resolve an entry name to a normalized path relative to the destination.
///
/// Returns `None` if the name is empty, absolute, or would leave the root.
pub fn local_path(name: &Path) -> Option<PathBuf> {
    if name.as_os_str().is_empty() {
        return None;
    }

    let mut out = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

/// Mode actually applied to an unpacked regular file.
#[must_use]
pub const fn clamp_mode(declared: u32) -> u32 {
    declared & FILE_MODE_MASK
}

/// Why an entry of `kind` cannot be placed at `relative`, if it cannot.
///
/// Only what is already on disk under `dest` is consulted. Links are never
/// created, so `symlink_metadata` sees plain files and directories only.
fn conflict(dest: &Path, relative: &Path, kind: EntryKind) -> Option<String> {
    if kind == EntryKind::RegularFile && relative.as_os_str().is_empty() {
        return Some(String::from("regular file resolves to the archive root"));
    }

    for ancestor in relative.ancestors().skip(1) {
        if ancestor.as_os_str().is_empty() {
            break;
        }
        if fs::symlink_metadata(dest.join(ancestor)).is_ok_and(|m| !m.is_dir()) {
            return Some(format!("{} is not a directory", ancestor.display()));
        }
    }

    let existing = fs::symlink_metadata(dest.join(relative)).ok()?;
    match kind {
        EntryKind::RegularFile if existing.is_dir() => {
            Some(format!("{} is already a directory", relative.display()))
        }
        EntryKind::Directory if !existing.is_dir() => {
            Some(format!("{} is already a file", relative.display()))
        }
        _ => None,
    }
}

fn create_dirs(path: &Path) -> Result<(), UnpackError> {
    mkdirs(path).map_err(|e| UnpackError::io(path, e))
}

fn mkdirs(path: &Path) -> io::Result<()> {
    DirBuilder::new().recursive(true).mode(DIR_MODE).create(path)
}

enum WriteError {
    Read(io::Error),
    Write(io::Error),
    OverBudget,
}

fn write_file<R: Read>(
    entry: &mut R,
    target: &Path,
    mode: u32,
    budget: u64,
) -> Result<u64, WriteError> {
    if let Some(parent) = target.parent() {
        mkdirs(parent).map_err(WriteError::Write)?;
    }

    // A later entry replaces an earlier one even if that one was read-only.
    match fs::remove_file(target) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(WriteError::Write(e)),
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(target)
        .map_err(WriteError::Write)?;

    let mut limited = entry.by_ref().take(budget.saturating_add(1));
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut written: u64 = 0;
    loop {
        let n = match limited.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(WriteError::Read(e)),
        };
        written += n as u64;
        if written > budget {
            return Err(WriteError::OverBudget);
        }
        io::Write::write_all(&mut file, &buf[..n]).map_err(WriteError::Write)?;
    }

    // Creation mode is filtered by the umask; apply the declared mode exactly.
    file.set_permissions(Permissions::from_mode(mode))
        .map_err(WriteError::Write)?;
    Ok(written)
}

/// Buffer size for streaming entry payloads (64 KiB).
const COPY_BUF_SIZE: usize = 64 * 1024;

/// Gzip reader that remembers whether decompression itself failed, so tar
/// errors can be told apart from codec errors.
struct Inflater<'a, R> {
    inner: MultiGzDecoder<R>,
    failed: &'a Cell<bool>,
}

impl<R: Read> Read for Inflater<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).inspect_err(|_| self.failed.set(true))
    }
}
