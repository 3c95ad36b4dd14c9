//! Release asset download
//!
//! The asset streams into `<name>.part` inside the update temp directory and
//! is renamed to `<name>` only after it passes the integrity checks. An
//! artifact left by an earlier attempt is removed first, and on any failure,
//! including cancellation, the part file is removed too.
//!
//! Downloads always verify certificates. The relaxed retry of the check does
//! not carry over to the executable that gets installed.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::manager::UpdateManager;
use super::release::ReleaseInfo;
use super::state::UpdateState;
use super::transport::{ReleaseTransport, TlsMode, TransportError};
use crate::config::update::APP_NAME;
use crate::error::{KeepsakeError, KeepsakeResult};

const CHUNK_SIZE: usize = 64 * 1024;

/// DOS header magic of Windows executables
const EXE_MAGIC: &[u8; 2] = b"MZ";

impl UpdateManager {
    /// Download `release` into the update temp directory
    ///
    /// `progress` receives the bytes received so far and the advertised
    /// total after every chunk; returning `ControlFlow::Break` cancels.
    pub fn download_update<F>(&mut self, release: &ReleaseInfo, progress: F) -> KeepsakeResult<PathBuf>
    where
        F: FnMut(u64, Option<u64>) -> ControlFlow<()>,
    {
        self.state.advance(UpdateState::Downloading)?;

        let outcome = download_to(
            self.transport.as_ref(),
            release,
            &self.paths.update_temp_dir(),
            self.config.download_timeout(),
            &self.config.manual_url(),
            progress,
        );

        match outcome {
            Ok(path) => {
                self.state.advance(UpdateState::ReadyToInstall)?;
                tracing::info!("Downloaded {} to {}", release.asset_name, path.display());
                Ok(path)
            }
            Err(e) => {
                self.state.advance(UpdateState::DownloadFailed)?;
                tracing::warn!("Download of {} failed: {}", release.asset_name, e);
                Err(e)
            }
        }
    }
}

fn download_to<F>(
    transport: &dyn ReleaseTransport,
    release: &ReleaseInfo,
    temp_dir: &Path,
    timeout: Duration,
    manual_url: &str,
    mut progress: F,
) -> KeepsakeResult<PathBuf>
where
    F: FnMut(u64, Option<u64>) -> ControlFlow<()>,
{
    let file_name = artifact_file_name(release);
    fs::create_dir_all(temp_dir).map_err(|e| {
        KeepsakeError::Io(format!("Failed to create {}: {}", temp_dir.display(), e))
    })?;
    let final_path = temp_dir.join(&file_name);
    match fs::remove_file(&final_path) {
        Ok(()) => tracing::debug!("Removed stale artifact {}", final_path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            return Err(KeepsakeError::Io(format!(
                "Failed to remove stale {}: {}",
                final_path.display(),
                e
            )))
        }
    }
    let mut part = PartFile::create(temp_dir.join(format!("{}.part", file_name)))?;

    let mut stream = transport
        .open_download(&release.download_url, TlsMode::Strict, timeout)
        .map_err(|e| match e {
            TransportError::Certificate(reason) => KeepsakeError::Network(format!(
                "Download of {} failed certificate verification ({}). Download it manually from {}",
                release.asset_name, reason, manual_url
            )),
            other => KeepsakeError::Network(format!(
                "Download of {} failed: {}",
                release.asset_name, other
            )),
        })?;
    let expected = stream.content_length.or(release.size);

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut header = Vec::with_capacity(EXE_MAGIC.len());
    let mut received: u64 = 0;

    loop {
        let n = match stream.reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(KeepsakeError::Network(format!(
                    "Download interrupted after {} bytes: {}",
                    received, e
                )))
            }
        };

        let wanted = EXE_MAGIC.len().saturating_sub(header.len()).min(n);
        header.extend_from_slice(&buf[..wanted]);

        part.write_all(&buf[..n])?;
        received += n as u64;

        if progress(received, expected).is_break() {
            tracing::info!("Download cancelled after {} bytes", received);
            return Err(KeepsakeError::DownloadCancelled(received));
        }
    }

    if received == 0 {
        return Err(KeepsakeError::DownloadIntegrity(
            "downloaded file is empty".into(),
        ));
    }
    if let Some(expected) = expected {
        if expected != received {
            return Err(KeepsakeError::DownloadIntegrity(format!(
                "expected {} bytes, received {}",
                expected, received
            )));
        }
    }
    if is_executable(&file_name) && header.as_slice() != EXE_MAGIC {
        return Err(KeepsakeError::DownloadIntegrity(format!(
            "{} is not a Windows executable",
            file_name
        )));
    }

    part.persist(&final_path)?;
    Ok(final_path)
}

/// Asset name if it is a plain file name, else a name derived from the version
fn artifact_file_name(release: &ReleaseInfo) -> String {
    let plain = Path::new(&release.asset_name)
        .file_name()
        .map_or(false, |n| n == release.asset_name.as_str());
    if plain && !release.asset_name.starts_with('.') {
        release.asset_name.clone()
    } else {
        format!("{}-{}.exe", APP_NAME, release.version)
    }
}

fn is_executable(file_name: &str) -> bool {
    file_name.to_lowercase().ends_with(".exe")
}

/// Partially downloaded file, removed on drop unless persisted
struct PartFile {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    persisted: bool,
}

impl PartFile {
    fn create(path: PathBuf) -> KeepsakeResult<Self> {
        let file = File::create(&path)
            .map_err(|e| KeepsakeError::Io(format!("Failed to create {}: {}", path.display(), e)))?;
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            persisted: false,
        })
    }

    fn write_all(&mut self, bytes: &[u8]) -> KeepsakeResult<()> {
        match self.writer.as_mut() {
            Some(writer) => writer
                .write_all(bytes)
                .map_err(|e| KeepsakeError::Io(format!("Failed to write {}: {}", self.path.display(), e))),
            None => Err(KeepsakeError::Io(format!("{} is closed", self.path.display()))),
        }
    }

    /// Flush, close and move into place
    fn persist(mut self, target: &Path) -> KeepsakeResult<()> {
        if let Some(writer) = self.writer.take() {
            let file = writer
                .into_inner()
                .map_err(|e| KeepsakeError::Io(format!("Failed to flush {}: {}", self.path.display(), e)))?;
            file.sync_all()?;
        }

        fs::rename(&self.path, target).map_err(|e| {
            KeepsakeError::Io(format!(
                "Failed to move {} to {}: {}",
                self.path.display(),
                target.display(),
                e
            ))
        })?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        // Close the handle first so the file can be removed on Windows
        self.writer.take();
        if !self.persisted {
            let _ = fs::remove_file(&self.path);
        }
    }
}
