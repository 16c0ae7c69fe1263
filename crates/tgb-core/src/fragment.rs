//! Splitting an oversized archive into bounded-size parts.
//!
//! Parts are named `<archive>.part<N>` with `N` starting at 1; concatenating
//! them in index order reproduces the archive byte for byte.

use std::{
    ffi::OsString,
    fs::File,
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};

use crate::{errors::Error, Result};

/// A split that stopped part-way.
///
/// `parts` lists every part path created so far (including the one that
/// failed) so the caller can decide what to clean up.
#[derive(Debug)]
pub struct SplitFailure {
    pub parts: Vec<PathBuf>,
    pub error: Error,
}

impl From<SplitFailure> for Error {
    fn from(f: SplitFailure) -> Self {
        f.error
    }
}

pub fn part_path(archive: &Path, index: u64) -> PathBuf {
    let mut os = OsString::from(archive.as_os_str());
    os.push(format!(".part{index}"));
    PathBuf::from(os)
}

/// Number of parts needed for `total` bytes at `limit` bytes per part.
pub fn part_count(total: u64, limit: u64) -> u64 {
    total.div_ceil(limit)
}

/// Index of a part file name produced for `archive_name`, if it is one.
pub fn parse_part_index(file_name: &str, archive_name: &str) -> Option<u64> {
    let digits = file_name.strip_prefix(archive_name)?.strip_prefix(".part")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// True for the archive itself or any of its parts.
pub fn is_artifact_name(file_name: &str, archive_name: &str) -> bool {
    file_name == archive_name || parse_part_index(file_name, archive_name).is_some()
}

/// Split `archive` into parts of at most `limit` bytes.
///
/// The source file is left untouched.
pub fn split(archive: &Path, limit: u64) -> std::result::Result<Vec<PathBuf>, SplitFailure> {
    let mut parts = Vec::new();
    match split_into(archive, limit, &mut parts) {
        Ok(()) => Ok(parts),
        Err(error) => Err(SplitFailure { parts, error }),
    }
}

fn split_into(archive: &Path, limit: u64, parts: &mut Vec<PathBuf>) -> Result<()> {
    if limit == 0 {
        return Err(Error::Config(
            "fragment limit must be greater than zero".to_string(),
        ));
    }

    let mut src = File::open(archive)?;
    let total = src.metadata()?.len();
    let count = part_count(total, limit);

    let mut offset = 0u64;
    for index in 1..=count {
        let dest = part_path(archive, index);
        parts.push(dest.clone());

        let expected = limit.min(total - offset);
        let written = write_fragment(&mut src, offset, limit, &dest)?;
        if written != expected {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "{} changed while splitting: part {index} got {written} of {expected} bytes",
                    archive.display()
                ),
            )));
        }
        offset += written;
    }

    tracing::debug!(archive = %archive.display(), parts = count, "archive split");
    Ok(())
}

/// Copy up to `len` bytes starting at `offset` of `src` into a new file.
///
/// Stopping early at end of file is not an error; the number of bytes
/// written is returned.
fn write_fragment(src: &mut File, offset: u64, len: u64, dest: &Path) -> Result<u64> {
    src.seek(SeekFrom::Start(offset))?;
    let mut out = File::create(dest)?;
    let written = io::copy(&mut Read::by_ref(src).take(len), &mut out)?;
    out.flush()?;
    Ok(written)
}

/// Hex SHA-256 of a file, streamed.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut f = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut f, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
