//! Shared fixtures for the update flow tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gaello_registry::StaticRegistry;
use gaello_updater::update::{
    EventCallback, Installer, Relauncher, UpdateEvent, UpdateNotice, UpdatePhase, UpdatePrompter,
};
use gaello_updater::{UpdateError, UpdateOrchestrator, UpdaterConfig, VersionDescriptor};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub(crate) const INSTALLER_PATH: &str = "/download/GaelloSetup.exe";

/// Bytes served as the installer download.
pub(crate) fn installer_bytes() -> Vec<u8> {
    (0..5000u32).map(|i| (i % 199) as u8).collect()
}

/// Release payload pointing at the mock installer.
pub(crate) fn release_json(server: &MockServer, version: f64) -> serde_json::Value {
    json!({
        "_id": "6620d1c4e13b",
        "version": version,
        "name": format!("Gaello {version}"),
        "target_resolutions": ["1920x1080", "2560x1440"],
        "url": format!("{}{INSTALLER_PATH}", server.uri()),
    })
}

/// Serve `version` from `/latest`.
pub(crate) async fn mount_latest(server: &MockServer, version: f64) {
    Mock::given(method("GET"))
        .and(path("/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(release_json(server, version)))
        .mount(server)
        .await;
}

/// Serve the installer, expecting exactly `times` downloads.
pub(crate) async fn mount_installer(server: &MockServer, times: u64) {
    Mock::given(method("GET"))
        .and(path(INSTALLER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(installer_bytes()))
        .expect(times)
        .mount(server)
        .await;
}

/// Files of a directory tree keyed by relative path.
pub(crate) fn tree(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    fn walk(base: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(base, &path, out);
            } else {
                let rel = path.strip_prefix(base).unwrap().to_path_buf();
                out.insert(rel, fs::read(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

pub(crate) fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path).map(|mut d| d.next().is_none()).unwrap_or(true)
}

/// What the fake installer does with the staging directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InstallerBehavior {
    /// Write the new build into staging.
    Populate,
    /// Run but leave staging empty.
    LeaveEmpty,
    /// Fail to start.
    Error,
}

pub(crate) struct FakeInstaller {
    behavior: InstallerBehavior,
    clobber: Option<PathBuf>,
    calls: AtomicUsize,
}

impl FakeInstaller {
    pub(crate) fn new(behavior: InstallerBehavior) -> Self {
        Self {
            behavior,
            clobber: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Before acting, replace the directory at `install_dir` with a plain
    /// file, so neither the swap nor a restore can remove it.
    pub(crate) fn clobbering(behavior: InstallerBehavior, install_dir: PathBuf) -> Self {
        Self {
            clobber: Some(install_dir),
            ..Self::new(behavior)
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Installer for FakeInstaller {
    async fn install(&self, binary: &Path, staging: &Path) -> gaello_updater::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(binary.is_file(), "installer binary missing: {}", binary.display());
        if let Some(install_dir) = &self.clobber {
            fs::remove_dir_all(install_dir)?;
            fs::write(install_dir, b"not a directory")?;
        }
        match self.behavior {
            InstallerBehavior::Populate => {
                fs::create_dir_all(staging.join("lib"))?;
                fs::write(staging.join("gaello.exe"), b"gaello v2")?;
                fs::write(staging.join("lib").join("charts.dll"), b"charts v2")?;
                Ok(())
            }
            InstallerBehavior::LeaveEmpty => {
                fs::create_dir_all(staging)?;
                Ok(())
            }
            InstallerBehavior::Error => Err(UpdateError::Install("installer crashed".into())),
        }
    }
}

/// Prompter with fixed answers that records what it was asked.
pub(crate) struct ScriptedPrompter {
    accept_download: bool,
    accept_install: bool,
    pub(crate) asked: Mutex<Vec<&'static str>>,
    pub(crate) notices: Mutex<Vec<UpdateNotice>>,
}

impl ScriptedPrompter {
    pub(crate) fn new(accept_download: bool, accept_install: bool) -> Self {
        Self {
            accept_download,
            accept_install,
            asked: Mutex::new(Vec::new()),
            notices: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn notices(&self) -> Vec<UpdateNotice> {
        self.notices.lock().unwrap().clone()
    }

    pub(crate) fn asked(&self) -> Vec<&'static str> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpdatePrompter for ScriptedPrompter {
    async fn confirm_download(&self, _release: &VersionDescriptor) -> bool {
        self.asked.lock().unwrap().push("download");
        self.accept_download
    }

    async fn confirm_install(&self, _release: &VersionDescriptor) -> bool {
        self.asked.lock().unwrap().push("install");
        self.accept_install
    }

    async fn notify(&self, notice: UpdateNotice) {
        self.notices.lock().unwrap().push(notice);
    }
}

#[derive(Default)]
pub(crate) struct CountingRelauncher {
    pub(crate) fail: bool,
    pub(crate) launches: AtomicUsize,
}

impl CountingRelauncher {
    pub(crate) fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl Relauncher for CountingRelauncher {
    fn launch(&self) -> gaello_updater::Result<()> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(UpdateError::Launch("script missing".into()))
        } else {
            Ok(())
        }
    }
}

/// Collects orchestrator events.
#[derive(Clone, Default)]
pub(crate) struct EventLog(Arc<Mutex<Vec<UpdateEvent>>>);

impl EventLog {
    pub(crate) fn callback(&self) -> EventCallback {
        let events = Arc::clone(&self.0);
        Box::new(move |event| events.lock().unwrap().push(event))
    }

    pub(crate) fn events(&self) -> Vec<UpdateEvent> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn phases(&self) -> Vec<UpdatePhase> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UpdateEvent::PhaseChanged(phase) => Some(phase),
                UpdateEvent::Progress(_) => None,
            })
            .collect()
    }

    pub(crate) fn progress_percents(&self) -> Vec<f64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UpdateEvent::Progress(p) => Some(p.percent),
                UpdateEvent::PhaseChanged(_) => None,
            })
            .collect()
    }
}

/// A temp workspace with an installed application and a mock server.
pub(crate) struct Fixture {
    pub(crate) dir: tempfile::TempDir,
    pub(crate) server: MockServer,
    pub(crate) config: UpdaterConfig,
}

impl Fixture {
    pub(crate) async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;

        let install = dir.path().join("Gaello");
        fs::create_dir_all(install.join("lib")).unwrap();
        fs::write(install.join("gaello.exe"), b"gaello v1").unwrap();
        fs::write(install.join("lib").join("charts.dll"), b"charts v1").unwrap();
        fs::write(install.join("fonts.ttf"), vec![3u8; 2048]).unwrap();

        let mut config = UpdaterConfig::default();
        config.check.endpoint_url = format!("{}/latest", server.uri());
        config.check.retry_count = 0;
        config.check.timeout_secs = 5;
        config.download.directory = dir.path().join("downloads");
        config.download.chunk_size = 1024;
        config.install.staging_dir = Some(dir.path().join("staging"));
        config.install.restart_notice_ms = 10;
        config.state_file = Some(dir.path().join("update-state.json"));
        config.logging.file = false;

        Self {
            dir,
            server,
            config,
        }
    }

    pub(crate) fn install_dir(&self) -> PathBuf {
        self.dir.path().join("Gaello")
    }

    pub(crate) fn backup_root(&self) -> PathBuf {
        self.dir.path().join("backups")
    }

    pub(crate) fn state_path(&self) -> PathBuf {
        self.dir.path().join("update-state.json")
    }

    pub(crate) fn orchestrator(
        &self,
        installer: Arc<FakeInstaller>,
        prompter: Arc<ScriptedPrompter>,
        relauncher: Arc<CountingRelauncher>,
        events: &EventLog,
    ) -> UpdateOrchestrator {
        let locator = Arc::new(StaticRegistry::single(
            "Gaello Trading Terminal",
            self.install_dir(),
        ));
        UpdateOrchestrator::new(self.config.clone(), locator, installer, prompter, relauncher)
            .with_backup_root(self.backup_root())
            .with_events(events.callback())
    }
}
