//! Test doubles for the update flow

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use tempfile::TempDir;

use super::install::{HandoffInstruction, ReplaceHelper};
use super::manager::UpdateManager;
use super::release::ReleaseInfo;
use super::transport::{DownloadStream, ReleaseTransport, TlsMode, TransportError};
use super::version::Version;
use crate::backup::BackupManager;
use crate::config::paths::KeepsakePaths;
use crate::config::settings::UpdateSettings;
use crate::config::update::UpdateConfig;
use crate::error::{KeepsakeError, KeepsakeResult};
use crate::registry::MemoryRegistry;

type DownloadResponse = Result<(Option<u64>, Vec<u8>), TransportError>;

#[derive(Default)]
struct TransportState {
    fetches: VecDeque<Result<Vec<u8>, TransportError>>,
    downloads: VecDeque<DownloadResponse>,
    fetch_calls: Vec<(String, TlsMode)>,
    download_calls: Vec<TlsMode>,
}

/// Transport answering from scripted responses
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Rc<RefCell<TransportState>>,
}

impl FakeTransport {
    pub fn push_fetch(&self, response: Result<Vec<u8>, TransportError>) {
        self.state.borrow_mut().fetches.push_back(response);
    }

    pub fn push_download(&self, response: DownloadResponse) {
        self.state.borrow_mut().downloads.push_back(response);
    }

    pub fn fetch_calls(&self) -> Vec<(String, TlsMode)> {
        self.state.borrow().fetch_calls.clone()
    }

    pub fn download_calls(&self) -> Vec<TlsMode> {
        self.state.borrow().download_calls.clone()
    }
}

impl ReleaseTransport for FakeTransport {
    fn fetch(&self, url: &str, tls: TlsMode, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state.borrow_mut();
        state.fetch_calls.push((url.to_string(), tls));
        state
            .fetches
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network("no scripted response".into())))
    }

    fn open_download(
        &self,
        _url: &str,
        tls: TlsMode,
        _timeout: Duration,
    ) -> Result<DownloadStream, TransportError> {
        let mut state = self.state.borrow_mut();
        state.download_calls.push(tls);
        let (content_length, body) = state
            .downloads
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Network("no scripted download".into())))?;
        Ok(DownloadStream {
            content_length,
            reader: Box::new(Cursor::new(body)),
        })
    }
}

/// Helper that records instructions instead of spawning anything
#[derive(Clone, Default)]
pub struct RecordingHelper {
    handoffs: Rc<RefCell<Vec<HandoffInstruction>>>,
    failure: Rc<RefCell<Option<String>>>,
}

impl RecordingHelper {
    pub fn handoffs(&self) -> Vec<HandoffInstruction> {
        self.handoffs.borrow().clone()
    }

    pub fn fail_with(&self, reason: &str) {
        *self.failure.borrow_mut() = Some(reason.to_string());
    }
}

impl ReplaceHelper for RecordingHelper {
    fn hand_off(&self, instruction: &HandoffInstruction) -> KeepsakeResult<()> {
        if let Some(reason) = self.failure.borrow().as_ref() {
            return Err(KeepsakeError::Io(reason.clone()));
        }
        self.handoffs.borrow_mut().push(instruction.clone());
        Ok(())
    }
}

/// Temp data directory, fakes and a stand-in executable
pub struct TestHarness {
    pub paths: KeepsakePaths,
    pub transport: FakeTransport,
    pub helper: RecordingHelper,
    pub current_exe: PathBuf,
    version: Version,
    _temp: TempDir,
}

impl TestHarness {
    pub fn new(current_version: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let paths = KeepsakePaths::with_base_dir(temp.path().join("data"));
        paths.ensure_directories().unwrap();

        let current_exe = temp.path().join("bin").join("keepsake.exe");
        fs::create_dir_all(current_exe.parent().unwrap()).unwrap();
        fs::write(&current_exe, b"old executable").unwrap();

        Self {
            paths,
            transport: FakeTransport::default(),
            helper: RecordingHelper::default(),
            current_exe,
            version: Version::parse(current_version).unwrap(),
            _temp: temp,
        }
    }

    pub fn backups(&self) -> BackupManager {
        BackupManager::new(&self.paths, Box::new(MemoryRegistry::new()))
    }

    pub fn manager(&self) -> UpdateManager {
        let config = UpdateConfig::new(self.version, &UpdateSettings::default());
        UpdateManager::new(
            config,
            self.paths.clone(),
            self.backups(),
            Box::new(self.transport.clone()),
            Box::new(self.helper.clone()),
        )
        .with_current_exe(self.current_exe.clone())
        .with_relaunch_args(vec!["--resume".into()])
    }
}

/// Latest-release JSON for `tag` with one matching executable asset
pub fn descriptor(tag: &str) -> Vec<u8> {
    let bare = tag.trim_start_matches(&['v', 'V'][..]);
    serde_json::json!({
        "tag_name": tag,
        "name": format!("Keepsake {}", bare),
        "body": "Release notes",
        "published_at": "2025-06-01T00:00:00Z",
        "assets": [{
            "name": format!("keepsake-{}.exe", bare),
            "browser_download_url": format!("https://example.invalid/keepsake-{}.exe", bare),
        }]
    })
    .to_string()
    .into_bytes()
}

pub fn release_info(version: &str, size: Option<u64>) -> ReleaseInfo {
    let version = Version::parse(version).unwrap();
    ReleaseInfo {
        version,
        name: format!("Keepsake {}", version),
        download_url: format!("https://example.invalid/keepsake-{}.exe", version),
        asset_name: format!("keepsake-{}.exe", version),
        published_at: String::new(),
        notes: String::new(),
        size,
    }
}

/// Bytes that pass the executable header check
pub fn exe_bytes(len: usize) -> Vec<u8> {
    let mut bytes: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    if len >= 2 {
        bytes[..2].copy_from_slice(b"MZ");
    }
    bytes
}
