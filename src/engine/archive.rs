// src/engine/archive.rs

//! Workspace archival: one gzip-compressed tarball per job.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use tar::Builder;

/// Directory name entries are stored under inside the archive.
pub const ARCHIVE_ROOT: &str = "workspace";

/// Compress everything below `src_dir` into a `.tar.gz` at `dest`.
///
/// Blocking; callers on the async runtime should go through
/// `spawn_blocking`.
pub fn compress_dir(src_dir: &Path, dest: &Path) -> Result<()> {
    let file =
        File::create(dest).with_context(|| format!("creating archive {:?}", dest))?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    builder
        .append_dir_all(ARCHIVE_ROOT, src_dir)
        .with_context(|| format!("adding {:?} to archive {:?}", src_dir, dest))?;

    let encoder = builder
        .into_inner()
        .with_context(|| format!("finishing tar stream for {:?}", dest))?;
    let mut writer = encoder
        .finish()
        .with_context(|| format!("finishing gzip stream for {:?}", dest))?;
    writer
        .flush()
        .with_context(|| format!("flushing archive {:?}", dest))?;

    Ok(())
}
