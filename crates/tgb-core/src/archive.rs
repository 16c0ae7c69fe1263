//! Zip packaging of a backup target.
//!
//! Directories are always packaged; single files only when they are too large
//! to send as-is. Entries are deflated.

use std::{
    fs::{self, File},
    io,
    path::{Component, Path, PathBuf},
};

use walkdir::WalkDir;
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

use crate::{errors::Error, fragment, Result};

/// Package `target` into a zip at `out`.
///
/// Directory entries are named relative to the directory root; a lone file is
/// named relative to `base`.
pub fn archive(target: &Path, out: &Path, base: &Path) -> Result<PathBuf> {
    let meta = fs::metadata(target)?;
    let entries = if meta.is_dir() {
        archive_dir(target, out)?
    } else {
        archive_file(target, out, base)?
    };
    tracing::info!(
        path = %target.display(),
        archive = %out.display(),
        entries,
        "archive written"
    );
    Ok(out.to_path_buf())
}

/// Zip every regular file below `dir`. Returns the entry count.
///
/// Symlinks to regular files are archived with the target's content under
/// the link's name; directory symlinks are not descended into. If `out` (or
/// one of its parts) lives inside `dir` it is skipped.
pub fn archive_dir(dir: &Path, out: &Path) -> Result<usize> {
    write_archive(out, |zip| {
        let own = OwnArtifacts::new(out)?;
        let mut entries = 0usize;
        for entry in WalkDir::new(dir).follow_links(false) {
            let entry = entry?;
            if !is_regular_file(&entry) {
                continue;
            }
            if own.contains(entry.path()) {
                continue;
            }

            let rel = entry
                .path()
                .strip_prefix(dir)
                .map_err(|_| Error::InvalidPath {
                    path: entry.path().to_path_buf(),
                    reason: format!("not below {}", dir.display()),
                })?;
            add_file(zip, entry.path(), &entry_name(rel)?)?;
            entries += 1;
        }
        Ok(entries)
    })
}

/// Zip a single file. Returns the entry count (always 1).
pub fn archive_file(file: &Path, out: &Path, base: &Path) -> Result<usize> {
    let name = single_entry_name(file, base)?;
    write_archive(out, |zip| {
        add_file(zip, file, &name)?;
        Ok(1)
    })
}

fn is_regular_file(entry: &walkdir::DirEntry) -> bool {
    let ft = entry.file_type();
    if ft.is_file() {
        return true;
    }
    if !ft.is_symlink() {
        return false;
    }
    match fs::metadata(entry.path()) {
        Ok(meta) => meta.is_file(),
        Err(e) => {
            tracing::warn!(path = %entry.path().display(), error = %e, "skipping dangling symlink");
            false
        }
    }
}

/// Create `out`, let `fill` add entries, and finalize the archive.
///
/// The writer is dropped on every path; on failure the partial archive is
/// removed before the error is returned.
fn write_archive(
    out: &Path,
    fill: impl FnOnce(&mut ZipWriter<File>) -> Result<usize>,
) -> Result<usize> {
    let file = File::create(out)?;
    let mut zip = ZipWriter::new(file);

    let res = fill(&mut zip).and_then(|n| {
        zip.finish()?;
        Ok(n)
    });

    drop(zip);
    if res.is_err() {
        if let Err(e) = fs::remove_file(out) {
            tracing::warn!(archive = %out.display(), error = %e, "failed to remove partial archive");
        }
    }
    res
}

fn add_file(zip: &mut ZipWriter<File>, path: &Path, name: &str) -> Result<u64> {
    let mut src = File::open(path)?;
    let meta = src.metadata()?;

    #[allow(unused_mut)]
    let mut opts = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(meta.len() >= u64::from(u32::MAX));
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        opts = opts.unix_permissions(meta.permissions().mode());
    }

    zip.start_file(name, opts)?;
    let copied = io::copy(&mut src, zip)?;
    Ok(copied)
}

/// Zip entry name for a relative path: `/`-separated, no `..` or roots.
fn entry_name(rel: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for comp in rel.components() {
        match comp {
            Component::CurDir => {}
            Component::Normal(os) => parts.push(os.to_string_lossy().into_owned()),
            _ => {
                return Err(Error::InvalidPath {
                    path: rel.to_path_buf(),
                    reason: "cannot be stored as a relative archive entry".to_string(),
                })
            }
        }
    }
    if parts.is_empty() {
        return Err(Error::InvalidPath {
            path: rel.to_path_buf(),
            reason: "empty archive entry name".to_string(),
        });
    }
    Ok(parts.join("/"))
}

/// Entry name for a lone file: relative to `base` when the file lives below
/// it, otherwise just the file name.
fn single_entry_name(file: &Path, base: &Path) -> Result<String> {
    let abs = fs::canonicalize(file)?;
    if let Ok(base) = fs::canonicalize(base) {
        if let Ok(rel) = abs.strip_prefix(&base) {
            return entry_name(rel);
        }
    }
    let name = abs.file_name().ok_or_else(|| Error::InvalidPath {
        path: file.to_path_buf(),
        reason: "has no file name".to_string(),
    })?;
    entry_name(Path::new(name))
}

/// The archive being written and any `.partN` siblings, for self-exclusion.
struct OwnArtifacts {
    dir: PathBuf,
    archive_name: String,
}

impl OwnArtifacts {
    fn new(out: &Path) -> Result<Self> {
        let parent = match out.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let archive_name = out
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidPath {
                path: out.to_path_buf(),
                reason: "archive path has no file name".to_string(),
            })?;
        Ok(Self {
            dir: fs::canonicalize(parent)?,
            archive_name,
        })
    }

    fn contains(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };
        if !fragment::is_artifact_name(&name, &self.archive_name) {
            return false;
        }
        path.parent()
            .and_then(|p| fs::canonicalize(p).ok())
            .is_some_and(|p| p == self.dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::BTreeMap, io::Read};
    use zip::ZipArchive;

    fn read_entries(path: &Path) -> BTreeMap<String, Vec<u8>> {
        let mut zip = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut out = BTreeMap::new();
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).unwrap();
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf).unwrap();
            out.insert(entry.name().to_string(), buf);
        }
        out
    }

    #[test]
    fn directory_entries_are_relative_files_only() {
        let src = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("nested/deeper")).unwrap();
        fs::create_dir_all(src.path().join("empty")).unwrap();
        fs::write(src.path().join("top.txt"), b"top").unwrap();
        fs::write(src.path().join("nested/deeper/leaf.bin"), [0u8, 1, 2]).unwrap();

        let out = work.path().join("salida.zip");
        let n = archive_dir(src.path(), &out).unwrap();
        assert_eq!(n, 2);

        let entries = read_entries(&out);
        assert_eq!(
            entries.keys().cloned().collect::<Vec<_>>(),
            vec!["nested/deeper/leaf.bin".to_string(), "top.txt".to_string()]
        );
        assert_eq!(entries["top.txt"], b"top");
        assert_eq!(entries["nested/deeper/leaf.bin"], vec![0u8, 1, 2]);
    }

    #[cfg(unix)]
    #[test]
    fn file_symlinks_are_followed_and_dir_symlinks_are_not() {
        use std::os::unix::fs::symlink;

        let src = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        fs::write(src.path().join("a.txt"), b"a").unwrap();
        fs::write(elsewhere.path().join("real.db"), b"rows").unwrap();
        fs::write(elsewhere.path().join("inner.txt"), b"inner").unwrap();
        symlink(elsewhere.path().join("real.db"), src.path().join("db.sqlite")).unwrap();
        symlink(elsewhere.path(), src.path().join("linked_dir")).unwrap();
        symlink(src.path().join("gone"), src.path().join("dangling")).unwrap();

        let out = work.path().join("salida.zip");
        let n = archive_dir(src.path(), &out).unwrap();
        assert_eq!(n, 2);

        let entries = read_entries(&out);
        assert_eq!(
            entries.keys().cloned().collect::<Vec<_>>(),
            vec!["a.txt".to_string(), "db.sqlite".to_string()]
        );
        assert_eq!(entries["db.sqlite"], b"rows");
    }

    #[test]
    fn archive_inside_target_is_not_packaged_into_itself() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("data.txt"), b"data").unwrap();
        fs::write(src.path().join("salida.zip.part1"), b"stale").unwrap();

        let out = src.path().join("salida.zip");
        archive_dir(src.path(), &out).unwrap();

        let entries = read_entries(&out);
        assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["data.txt"]);
    }

    #[test]
    fn single_file_is_named_relative_to_base() {
        let base = tempfile::tempdir().unwrap();
        fs::create_dir_all(base.path().join("sub")).unwrap();
        let file = base.path().join("sub/big.log");
        fs::write(&file, b"log line\n").unwrap();

        let out = base.path().join("salida.zip");
        archive(&file, &out, base.path()).unwrap();
        let entries = read_entries(&out);
        assert_eq!(entries["sub/big.log"], b"log line\n");
    }

    #[test]
    fn single_file_outside_base_uses_file_name() {
        let base = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let file = elsewhere.path().join("big.log");
        fs::write(&file, b"x").unwrap();

        let out = base.path().join("salida.zip");
        archive_file(&file, &out, base.path()).unwrap();
        assert!(read_entries(&out).contains_key("big.log"));
    }

    #[test]
    fn failed_archive_is_removed() {
        let work = tempfile::tempdir().unwrap();
        let out = work.path().join("salida.zip");
        let err = archive_dir(&work.path().join("missing"), &out).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(!out.exists());
    }

    #[test]
    fn entry_names_reject_traversal() {
        assert!(entry_name(Path::new("../x")).is_err());
        assert!(entry_name(Path::new("")).is_err());
        assert_eq!(entry_name(Path::new("./a/b")).unwrap(), "a/b");
    }
}
