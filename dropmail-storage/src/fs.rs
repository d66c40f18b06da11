use anyhow::{Context as _, Result};
use std::{
    fs, io,
    io::Write as _,
    path::{Path, PathBuf},
};

pub(crate) fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(|c: char| c == '/' || c == '\\' || c.is_control())
}

fn list(dir: &Path, want_dir: bool) -> Result<Vec<(String, PathBuf)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => {
            return Err(error).with_context(|| format!("Cannot list {}", dir.display()))
        }
    };

    let mut list = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Cannot list {}", dir.display()))?;
        let file_type = entry
            .file_type()
            .with_context(|| format!("Cannot stat {}", entry.path().display()))?;
        if file_type.is_dir() != want_dir {
            continue;
        }

        // non UTF-8 names are not ours
        if let Ok(name) = entry.file_name().into_string() {
            if is_valid_name(&name) {
                list.push((name, entry.path()));
            }
        }
    }
    list.sort();

    Ok(list)
}

/// names of the non hidden sub directories, sorted
pub(crate) fn list_dirs(dir: &Path) -> Result<Vec<String>> {
    Ok(list(dir, true)?.into_iter().map(|(name, _)| name).collect())
}

/// non hidden files, sorted by name
pub(crate) fn list_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    list(dir, false)
}

pub(crate) fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error).with_context(|| format!("Cannot read {}", path.display())),
    }
}

/// replace the content of the file at `path` with `content`
///
/// readers see either the old or the new content, never a partial write
pub(crate) fn write_atomically(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("No parent directory for {}", path.display()))?;
    fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;

    let mut file = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(dir)
        .with_context(|| format!("Cannot create temporary file in {}", dir.display()))?;
    file.write_all(content)
        .and_then(|()| file.as_file().sync_all())
        .with_context(|| format!("Cannot write {}", file.path().display()))?;
    file.persist(path)
        .map_err(|error| error.error)
        .with_context(|| format!("Cannot commit {}", path.display()))?;

    Ok(())
}

/// create `target` as a new name of `source`
///
/// returns `false` without touching anything if `target` already exists
pub(crate) fn link_no_clobber(source: &Path, target: &Path) -> Result<bool> {
    match fs::hard_link(source, target) {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(error) => Err(error).with_context(|| {
            format!(
                "Cannot link {} to {}",
                source.display(),
                target.display()
            )
        }),
    }
}

/// move `source` to `target` unless `target` already exists
///
/// returns `false` without touching anything if `target` exists. The
/// check and the rename are two steps: callers must be the only ones
/// moving files to names of that form.
pub(crate) fn rename_no_clobber(source: &Path, target: &Path) -> Result<bool> {
    match fs::symlink_metadata(target) {
        Ok(_) => return Ok(false),
        Err(error) if error.kind() == io::ErrorKind::NotFound => (),
        Err(error) => {
            return Err(error).with_context(|| format!("Cannot stat {}", target.display()))
        }
    }

    fs::rename(source, target).with_context(|| {
        format!(
            "Cannot move {} to {}",
            source.display(),
            target.display()
        )
    })?;
    Ok(true)
}
