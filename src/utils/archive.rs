//! Directory <-> zip archive codec used to export and import session directories.
//!
//! Packing reads every file with async I/O, then hands compression to the
//! blocking pool so request handling is not stalled. The archive is written to
//! a temporary file next to the destination and renamed into place only after
//! the central directory has been flushed; a failed pack leaves nothing behind.
//!
//! Unpacking decompresses on the blocking pool, then runs a concurrent
//! read-then-rewrite pass over every extracted file.

use std::{
    fs::File,
    io::{self, Write},
    path::{Component, Path, PathBuf},
};

use futures::future::try_join_all;
use thiserror::Error;
use walkdir::WalkDir;
use zip::{CompressionMethod, ZipArchive, ZipWriter, result::ZipError, write::SimpleFileOptions};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed archive: {0}")]
    Malformed(String),

    #[error("unsafe entry path: {0}")]
    UnsafePath(String),

    #[error("archive task failed: {0}")]
    Task(String),
}

impl From<ZipError> for ArchiveError {
    fn from(err: ZipError) -> Self {
        match err {
            ZipError::Io(e) => ArchiveError::Io(e),
            other => ArchiveError::Malformed(other.to_string()),
        }
    }
}

impl From<walkdir::Error> for ArchiveError {
    fn from(err: walkdir::Error) -> Self {
        ArchiveError::Io(err.into())
    }
}

impl From<tokio::task::JoinError> for ArchiveError {
    fn from(err: tokio::task::JoinError) -> Self {
        ArchiveError::Task(err.to_string())
    }
}

/// A file queued for packing: path on disk and its name inside the archive.
struct PackEntry {
    path: PathBuf,
    name: String,
}

/// Pack every regular file under `source` into a deflate-compressed zip at `destination`.
///
/// Entry names are `/`-separated paths relative to `source`.
pub async fn pack(source: &Path, destination: &Path) -> Result<(), ArchiveError> {
    let root = source.to_path_buf();
    let entries = tokio::task::spawn_blocking(move || collect_files(&root)).await??;

    let mut contents = Vec::with_capacity(entries.len());
    for entry in entries {
        let data = tokio::fs::read(&entry.path).await?;
        tracing::debug!(file = %entry.name, bytes = data.len(), "read file for archive");
        contents.push((entry.name, data));
    }

    let destination = destination.to_path_buf();
    tokio::task::spawn_blocking(move || write_archive(&destination, contents)).await??;
    Ok(())
}

fn collect_files(root: &Path) -> Result<Vec<PackEntry>, ArchiveError> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| ArchiveError::Io(io::Error::other(e)))?;
        entries.push(PackEntry {
            path: entry.path().to_path_buf(),
            name: archive_name(relative),
        });
    }
    Ok(entries)
}

fn archive_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn write_archive(destination: &Path, contents: Vec<(String, Vec<u8>)>) -> Result<(), ArchiveError> {
    let parent = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let staging = tempfile::Builder::new()
        .prefix(".parley-")
        .suffix(".zip.partial")
        .tempfile_in(parent)?;

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(staging);
    for (name, data) in contents {
        writer.start_file(name, options)?;
        writer.write_all(&data)?;
    }
    let staging = writer.finish()?;
    staging.as_file().sync_all()?;
    staging
        .persist(destination)
        .map_err(|e| ArchiveError::Io(e.error))?;
    Ok(())
}

/// Extract the zip at `archive` into `destination`, recreating relative paths.
///
/// Returns the extracted file paths. Files written before a failing entry are
/// left in place.
pub async fn unpack(archive: &Path, destination: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let archive = archive.to_path_buf();
    let root = destination.to_path_buf();
    let files = tokio::task::spawn_blocking(move || extract_all(&archive, &root)).await??;

    try_join_all(files.iter().map(|path| rewrite(path))).await?;
    Ok(files)
}

fn extract_all(archive: &Path, destination: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file)?;
    std::fs::create_dir_all(destination)?;

    let mut files = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| ArchiveError::UnsafePath(entry.name().to_string()))?;
        let out_path = destination.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;
        tracing::debug!(file = %out_path.display(), "extracted archive entry");
        files.push(out_path);
    }
    Ok(files)
}

/// Read the file back and rewrite it so its contents are fully materialized on disk.
async fn rewrite(path: &Path) -> Result<(), ArchiveError> {
    let data = tokio::fs::read(path).await?;
    let mut file = tokio::fs::File::create(path).await?;
    tokio::io::AsyncWriteExt::write_all(&mut file, &data).await?;
    file.sync_all().await?;
    Ok(())
}
