use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use super::*;

pub const APP_INFO_DIR: &str = "app-info";
pub const VERSION_DIR: &str = "version";
/// Largest metadata file we will read.
pub const MAX_FILE_BYTES: u64 = 1024 * 1024;

pub(crate) fn check_segment(kind: &'static str, value: &str) -> Result<(), MetadataError> {
    let trimmed = value.trim();
    let bad = trimmed.is_empty()
        || trimmed != value
        || value.contains(['/', '\\'])
        || value.contains("..");
    if bad {
        return Err(MetadataError::InvalidSegment {
            kind,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// `<root>/app-info/<locale>.json`
pub fn app_info_localization_path(root: &Path, locale: &str) -> Result<PathBuf, MetadataError> {
    check_segment("locale", locale)?;
    Ok(root.join(APP_INFO_DIR).join(format!("{locale}.json")))
}

/// `<root>/version/<version>/<locale>.json`
pub fn version_localization_path(root: &Path, version: &str, locale: &str) -> Result<PathBuf, MetadataError> {
    check_segment("version", version)?;
    check_segment("locale", locale)?;
    Ok(root.join(VERSION_DIR).join(version).join(format!("{locale}.json")))
}

// ─── Safe file IO ────────────────────────────────────────────────────────────

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> MetadataError + '_ {
    move |source| MetadataError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn no_follow(opts: &mut OpenOptions) -> &mut OpenOptions {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.custom_flags(libc::O_NOFOLLOW);
    }
    opts
}

/// Stat without following links; `None` when nothing is there.
fn existing_entry(path: &Path) -> Result<Option<fs::Metadata>, MetadataError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => Err(MetadataError::Symlink(path.to_path_buf())),
        Ok(meta) if !meta.is_file() => Err(MetadataError::NotRegularFile(path.to_path_buf())),
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path)(e)),
    }
}

/// Write `data` to `path`, never through a symlink. Existing regular files
/// are replaced only when `overwrite` is set.
pub fn write_file_safely(path: &Path, data: &[u8], overwrite: bool) -> Result<(), MetadataError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let existing = existing_entry(path)?;
    let mut opts = OpenOptions::new();
    opts.write(true);
    match existing {
        Some(_) if !overwrite => return Err(MetadataError::AlreadyExists(path.to_path_buf())),
        Some(_) => {
            opts.truncate(true);
        }
        None => {
            opts.create_new(true);
        }
    }

    let mut file = no_follow(&mut opts).open(path).map_err(|e| {
        if path.is_symlink() {
            MetadataError::Symlink(path.to_path_buf())
        } else {
            io_err(path)(e)
        }
    })?;
    verify_regular(&file, path)?;
    file.write_all(data).map_err(io_err(path))?;
    Ok(())
}

fn verify_regular(file: &File, path: &Path) -> Result<(), MetadataError> {
    let meta = file.metadata().map_err(io_err(path))?;
    if !meta.is_file() {
        return Err(MetadataError::NotRegularFile(path.to_path_buf()));
    }
    Ok(())
}

/// Read a regular file of at most [`MAX_FILE_BYTES`], refusing symlinks.
pub fn read_file_safely(path: &Path) -> Result<Vec<u8>, MetadataError> {
    let Some(meta) = existing_entry(path)? else {
        return Err(io_err(path)(std::io::ErrorKind::NotFound.into()));
    };
    if meta.len() > MAX_FILE_BYTES {
        return Err(MetadataError::TooLarge {
            path: path.to_path_buf(),
            limit: MAX_FILE_BYTES,
        });
    }

    let mut opts = OpenOptions::new();
    opts.read(true);
    let file = no_follow(&mut opts).open(path).map_err(io_err(path))?;
    verify_regular(&file, path)?;

    let mut data = Vec::new();
    file.take(MAX_FILE_BYTES + 1)
        .read_to_end(&mut data)
        .map_err(io_err(path))?;
    if data.len() as u64 > MAX_FILE_BYTES {
        return Err(MetadataError::TooLarge {
            path: path.to_path_buf(),
            limit: MAX_FILE_BYTES,
        });
    }
    Ok(data)
}

pub fn write_app_info_localization_file(
    path: &Path,
    record: &AppInfoLocalization,
    overwrite: bool,
) -> Result<(), MetadataError> {
    write_file_safely(path, &with_newline(encode_app_info_localization(record)), overwrite)
}

pub fn read_app_info_localization_file(path: &Path) -> Result<AppInfoLocalization, MetadataError> {
    decode_app_info_localization(&read_file_safely(path)?)
}

pub fn write_version_localization_file(
    path: &Path,
    record: &VersionLocalization,
    overwrite: bool,
) -> Result<(), MetadataError> {
    write_file_safely(path, &with_newline(encode_version_localization(record)), overwrite)
}

pub fn read_version_localization_file(path: &Path) -> Result<VersionLocalization, MetadataError> {
    decode_version_localization(&read_file_safely(path)?)
}

fn with_newline(mut bytes: Vec<u8>) -> Vec<u8> {
    bytes.push(b'\n');
    bytes
}

// ─── Write plans ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePlan {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

pub type AppInfoTree = BTreeMap<String, AppInfoLocalization>;
/// version string → locale → record
pub type VersionTree = BTreeMap<String, BTreeMap<String, VersionLocalization>>;

/// One plan per app-info locale and per (version, locale) pair, sorted by
/// path. Contents are canonical bytes plus a trailing newline.
pub fn build_write_plans(
    root: &Path,
    app_info: &AppInfoTree,
    versions: &VersionTree,
) -> Result<Vec<WritePlan>, MetadataError> {
    let mut plans = Vec::new();
    for (locale, record) in app_info {
        plans.push(WritePlan {
            path: app_info_localization_path(root, locale)?,
            contents: with_newline(encode_app_info_localization(record)),
        });
    }
    for (version, locales) in versions {
        for (locale, record) in locales {
            plans.push(WritePlan {
                path: version_localization_path(root, version, locale)?,
                contents: with_newline(encode_version_localization(record)),
            });
        }
    }
    plans.sort_by(|a, b| a.path.as_os_str().cmp(b.path.as_os_str()));
    Ok(plans)
}

/// Apply plans in order. Returns the written paths.
pub fn apply_write_plans(plans: &[WritePlan], overwrite: bool) -> Result<Vec<PathBuf>, MetadataError> {
    let mut written = Vec::with_capacity(plans.len());
    for plan in plans {
        write_file_safely(&plan.path, &plan.contents, overwrite)?;
        written.push(plan.path.clone());
    }
    Ok(written)
}

// ─── Reading a tree ──────────────────────────────────────────────────────────

/// Metadata read back from disk, keyed the same way as the write plans.
#[derive(Debug, Default)]
pub struct MetadataTree {
    pub app_info: AppInfoTree,
    pub versions: VersionTree,
}

impl MetadataTree {
    pub fn is_empty(&self) -> bool {
        self.app_info.is_empty() && self.versions.values().all(BTreeMap::is_empty)
    }
}

/// `*.json` files directly under `dir`, as `(stem, path)` sorted by stem.
fn json_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, MetadataError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(dir)(e)),
    };
    let mut out = Vec::new();
    for entry in entries {
        let path = entry.map_err(io_err(dir))?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            check_segment("locale", stem)?;
            out.push((stem.to_string(), path));
        }
    }
    out.sort();
    Ok(out)
}

fn version_dirs(root: &Path) -> Result<Vec<String>, MetadataError> {
    let dir = root.join(VERSION_DIR);
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(&dir)(e)),
    };
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(io_err(&dir))?;
        let is_dir = entry.file_type().map_err(io_err(&dir))?.is_dir();
        if let (true, Some(name)) = (is_dir, entry.file_name().to_str()) {
            out.push(name.to_string());
        }
    }
    out.sort();
    Ok(out)
}

/// Read the canonical tree under `root`. With `only_version`, other version
/// directories are ignored.
pub fn read_tree(root: &Path, only_version: Option<&str>) -> Result<MetadataTree, MetadataError> {
    let mut tree = MetadataTree::default();
    for (locale, path) in json_files(&root.join(APP_INFO_DIR))? {
        tree.app_info.insert(locale, read_app_info_localization_file(&path)?);
    }

    let versions = match only_version {
        Some(v) => {
            check_segment("version", v)?;
            vec![v.to_string()]
        }
        None => version_dirs(root)?,
    };
    for version in versions {
        check_segment("version", &version)?;
        let mut locales = BTreeMap::new();
        for (locale, path) in json_files(&root.join(VERSION_DIR).join(&version))? {
            locales.insert(locale, read_version_localization_file(&path)?);
        }
        if !locales.is_empty() {
            tree.versions.insert(version, locales);
        }
    }
    Ok(tree)
}
