// Single-file downloader. Streams a Drive file into its group folder,
// never touching a file that is already there. Failures are logged and
// reported through `DownloadOutcome` so one bad file never stops a run.

use crate::api::FileSource;
use crate::error::{Error, Result};
use crate::folder::file_name_for_disk;
use crate::model::DriveFile;
use crate::ui;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

const CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, PartialEq)]
pub enum DownloadOutcome {
    Downloaded(PathBuf),
    /// Destination already existed; nothing was fetched.
    Skipped(PathBuf),
    Failed,
}

/// Create `dir` and its parents, and check it really is a directory.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    tracing::debug!("creating directory {}", dir.display());
    fs::create_dir_all(dir).map_err(|e| Error::directory(dir, e))?;
    if !dir.is_dir() {
        let e = std::io::Error::new(ErrorKind::Other, "not a directory");
        return Err(Error::directory(dir, e));
    }
    Ok(())
}

/// Download `file` into `dir` unless it is already present.
pub fn download_file(source: &dyn FileSource, file: &DriveFile, dir: &Path) -> DownloadOutcome {
    let name = file_name_for_disk(&file.file_name());
    match try_download(source, &file.id, &name, dir) {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!("{}", failure_message(&e, &dir.join(&name), &name));
            DownloadOutcome::Failed
        }
    }
}

/// Log line for a failed download. Filesystem errors name the path that
/// failed: the group directory for `Directory`, the file otherwise.
fn failure_message(e: &Error, path: &Path, name: &str) -> String {
    let (path, io) = match e {
        Error::Directory { path, source } => (path.as_path(), source),
        Error::Io(io) => (path, io),
        other => return format!("error downloading file {}: {}", name, other),
    };
    let what = if io.kind() == ErrorKind::PermissionDenied {
        "permission denied"
    } else {
        "OS error"
    };
    format!("{} when accessing {}: {}", what, path.display(), io)
}

fn try_download(
    source: &dyn FileSource,
    file_id: &str,
    name: &str,
    dir: &Path,
) -> Result<DownloadOutcome> {
    ensure_dir(dir)?;

    let path = dir.join(name);
    if path.exists() {
        ui::info(&format!(
            "File {} already exists at {}, skipping download.",
            name,
            path.display()
        ));
        return Ok(DownloadOutcome::Skipped(path));
    }

    let part = dir.join(format!("{}.part", name));
    let result = stream_to(source, file_id, name, &part);
    if let Err(e) = result {
        let _ = fs::remove_file(&part);
        return Err(e);
    }
    fs::rename(&part, &path)?;

    ui::info(&format!("Downloaded: {}", path.display()));
    Ok(DownloadOutcome::Downloaded(path))
}

fn stream_to(source: &dyn FileSource, file_id: &str, name: &str, part: &Path) -> Result<u64> {
    let mut content = source.open(file_id)?;
    let mut out = File::create(part)?;
    let bar = ui::download_bar(name, content.len);

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written: u64 = 0;
    loop {
        let n = match content.reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                bar.abandon();
                return Err(e.into());
            }
        };
        if let Err(e) = out.write_all(&buf[..n]) {
            bar.abandon();
            return Err(e.into());
        }
        written += n as u64;
        bar.set_position(written);
        if let Some(total) = content.len.filter(|t| *t > 0) {
            tracing::debug!("Downloading {}: {}%", name, written * 100 / total);
        }
    }
    out.flush()?;
    bar.finish_and_clear();
    tracing::debug!("Downloading {}: 100% ({} bytes)", name, written);
    Ok(written)
}
