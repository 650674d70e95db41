//! End-to-end orchestrator runs against a mock release server, a temp install
//! directory and fake installer/prompter/relauncher collaborators.

use std::sync::Arc;

use gaello_registry::StaticRegistry;
use gaello_updater::update::{
    ConsentStage, UpdateNotice, UpdatePhase, UpdateStage, UpdateState,
};
use gaello_updater::{ReleaseNumber, UpdateOrchestrator, UpdateOutcome};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::helpers::{
    CountingRelauncher, EventLog, FakeInstaller, Fixture, InstallerBehavior, ScriptedPrompter,
    is_empty_dir, mount_installer, mount_latest, tree,
};

fn v(value: f64) -> ReleaseNumber {
    ReleaseNumber::new(value).unwrap()
}

#[tokio::test]
async fn accepted_update_is_installed_and_relaunched() {
    let fx = Fixture::new().await;
    mount_latest(&fx.server, 2.0).await;
    mount_installer(&fx.server, 1).await;

    let installer = Arc::new(FakeInstaller::new(InstallerBehavior::Populate));
    let prompter = Arc::new(ScriptedPrompter::new(true, true));
    let relauncher = Arc::new(CountingRelauncher::default());
    let events = EventLog::default();
    let orchestrator = fx.orchestrator(installer.clone(), prompter.clone(), relauncher.clone(), &events);

    let (outcome, session) = orchestrator.run_session().await.unwrap();

    assert_eq!(
        outcome,
        UpdateOutcome::Installed {
            version: v(2.0),
            relaunched: true
        }
    );
    assert!(!session.closed_before_timeout);
    assert_eq!(session.release.as_ref().map(|r| r.version()), Some(v(2.0)));
    assert_eq!(installer.calls(), 1);
    assert_eq!(relauncher.launches(), 1);
    assert_eq!(prompter.asked(), vec!["download", "install"]);

    // New build replaced the old tree entirely.
    let installed = tree(&fx.install_dir());
    assert_eq!(installed.len(), 2);
    assert_eq!(installed[&std::path::PathBuf::from("gaello.exe")], b"gaello v2");
    assert!(!fx.install_dir().join("fonts.ttf").exists());

    // Snapshot, staging and installer are gone.
    assert!(is_empty_dir(&fx.backup_root()));
    assert!(!fx.dir.path().join("staging").exists());
    assert!(!session.download_path.unwrap().exists());

    let percents = events.progress_percents();
    assert!(!percents.is_empty());
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(percents.last().copied(), Some(100.0));

    assert_eq!(
        events.phases(),
        vec![
            UpdatePhase::Checking,
            UpdatePhase::AwaitingDownloadConsent,
            UpdatePhase::Downloading,
            UpdatePhase::AwaitingInstallConsent,
            UpdatePhase::BackingUp,
            UpdatePhase::Installing,
            UpdatePhase::Relaunching,
            UpdatePhase::Terminal(outcome),
        ]
    );
    assert!(matches!(
        prompter.notices().as_slice(),
        [UpdateNotice::RestartPending { .. }]
    ));

    let state = UpdateState::load_from(&fx.state_path());
    assert_eq!(state.last_seen_version, Some(v(2.0)));
    assert!(state.pending_download.is_none());
}

#[tokio::test]
async fn empty_staging_restores_once_and_deletes_backup() {
    let fx = Fixture::new().await;
    mount_latest(&fx.server, 2.0).await;
    mount_installer(&fx.server, 1).await;
    let before = tree(&fx.install_dir());

    let installer = Arc::new(FakeInstaller::new(InstallerBehavior::LeaveEmpty));
    let prompter = Arc::new(ScriptedPrompter::new(true, true));
    let relauncher = Arc::new(CountingRelauncher::default());
    let events = EventLog::default();
    let orchestrator = fx.orchestrator(installer.clone(), prompter.clone(), relauncher.clone(), &events);

    let outcome = orchestrator.run().await.unwrap();

    match &outcome {
        UpdateOutcome::Failed {
            stage,
            message,
            degraded,
        } => {
            assert_eq!(*stage, UpdateStage::Install);
            assert!(message.contains("did not produce any files"), "message: {message}");
            assert!(!degraded);
        }
        other => panic!("expected failure, got {other:?}"),
    }

    let restores = events
        .phases()
        .into_iter()
        .filter(|p| *p == UpdatePhase::Restoring)
        .count();
    assert_eq!(restores, 1);
    assert_eq!(tree(&fx.install_dir()), before);
    assert!(is_empty_dir(&fx.backup_root()));
    assert_eq!(relauncher.launches(), 0);
    assert!(matches!(
        prompter.notices().as_slice(),
        [UpdateNotice::Failed {
            stage: UpdateStage::Install,
            ..
        }]
    ));
}

#[tokio::test]
async fn installer_error_is_rolled_back() {
    let fx = Fixture::new().await;
    mount_latest(&fx.server, 2.0).await;
    mount_installer(&fx.server, 1).await;
    let before = tree(&fx.install_dir());

    let installer = Arc::new(FakeInstaller::new(InstallerBehavior::Error));
    let prompter = Arc::new(ScriptedPrompter::new(true, true));
    let relauncher = Arc::new(CountingRelauncher::default());
    let events = EventLog::default();
    let orchestrator = fx.orchestrator(installer, prompter, relauncher, &events);

    let outcome = orchestrator.run().await.unwrap();

    assert!(matches!(
        outcome,
        UpdateOutcome::Failed {
            stage: UpdateStage::Install,
            degraded: false,
            ..
        }
    ));
    assert!(events.phases().contains(&UpdatePhase::Restoring));
    assert_eq!(tree(&fx.install_dir()), before);
    assert!(is_empty_dir(&fx.backup_root()));
}

#[tokio::test]
async fn declining_download_touches_nothing() {
    let fx = Fixture::new().await;
    mount_latest(&fx.server, 2.0).await;
    mount_installer(&fx.server, 0).await;
    let before = tree(&fx.install_dir());

    let installer = Arc::new(FakeInstaller::new(InstallerBehavior::Populate));
    let prompter = Arc::new(ScriptedPrompter::new(false, true));
    let relauncher = Arc::new(CountingRelauncher::default());
    let events = EventLog::default();
    let orchestrator = fx.orchestrator(installer.clone(), prompter.clone(), relauncher, &events);

    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(
        outcome,
        UpdateOutcome::Declined {
            stage: ConsentStage::Download
        }
    );
    assert_eq!(prompter.asked(), vec!["download"]);
    assert_eq!(installer.calls(), 0);
    assert_eq!(tree(&fx.install_dir()), before);
    assert!(!fx.backup_root().exists());
}

#[tokio::test]
async fn declining_install_keeps_download_for_next_run() {
    let fx = Fixture::new().await;
    mount_latest(&fx.server, 2.0).await;
    // One transfer across both runs: the second run reuses the file.
    mount_installer(&fx.server, 1).await;
    let before = tree(&fx.install_dir());

    let installer = Arc::new(FakeInstaller::new(InstallerBehavior::Populate));
    let relauncher = Arc::new(CountingRelauncher::default());

    let first_events = EventLog::default();
    let first = fx.orchestrator(
        installer.clone(),
        Arc::new(ScriptedPrompter::new(true, false)),
        relauncher.clone(),
        &first_events,
    );
    let outcome = first.run().await.unwrap();
    assert_eq!(
        outcome,
        UpdateOutcome::Declined {
            stage: ConsentStage::Install
        }
    );
    assert_eq!(installer.calls(), 0);
    assert_eq!(tree(&fx.install_dir()), before);

    let state = UpdateState::load_from(&fx.state_path());
    let pending = state.pending_download.clone().unwrap();
    assert_eq!(pending.version, v(2.0));
    assert!(pending.path.is_file());

    let second_events = EventLog::default();
    let second = fx.orchestrator(
        installer.clone(),
        Arc::new(ScriptedPrompter::new(true, true)),
        relauncher.clone(),
        &second_events,
    );
    let outcome = second.run().await.unwrap();

    assert!(matches!(outcome, UpdateOutcome::Installed { .. }));
    assert_eq!(second_events.progress_percents(), vec![100.0]);
    assert_eq!(installer.calls(), 1);
    assert!(UpdateState::load_from(&fx.state_path()).pending_download.is_none());
}

#[tokio::test]
async fn up_to_date_asks_nothing() {
    let fx = Fixture::new().await;
    mount_latest(&fx.server, 1.411).await;
    mount_installer(&fx.server, 0).await;

    let prompter = Arc::new(ScriptedPrompter::new(true, true));
    let events = EventLog::default();
    let orchestrator = fx.orchestrator(
        Arc::new(FakeInstaller::new(InstallerBehavior::Populate)),
        prompter.clone(),
        Arc::new(CountingRelauncher::default()),
        &events,
    );

    assert_eq!(orchestrator.run().await.unwrap(), UpdateOutcome::UpToDate);
    assert!(prompter.asked().is_empty());
    assert!(prompter.notices().is_empty());
    assert!(UpdateState::load_from(&fx.state_path()).last_check.is_some());
}

#[tokio::test]
async fn missing_installation_fails_before_install() {
    let fx = Fixture::new().await;
    mount_latest(&fx.server, 2.0).await;
    mount_installer(&fx.server, 1).await;

    let installer = Arc::new(FakeInstaller::new(InstallerBehavior::Populate));
    let prompter = Arc::new(ScriptedPrompter::new(true, true));
    let events = EventLog::default();
    let orchestrator = UpdateOrchestrator::new(
        fx.config.clone(),
        Arc::new(StaticRegistry::default()),
        installer.clone(),
        prompter.clone(),
        Arc::new(CountingRelauncher::default()),
    )
    .with_backup_root(fx.backup_root())
    .with_events(events.callback());

    let outcome = orchestrator.run().await.unwrap();

    assert!(matches!(
        outcome,
        UpdateOutcome::Failed {
            stage: UpdateStage::Backup,
            ..
        }
    ));
    assert_eq!(installer.calls(), 0);
    assert!(!events.phases().contains(&UpdatePhase::Installing));
}

#[tokio::test]
async fn download_status_error_fails_download_stage() {
    let fx = Fixture::new().await;
    mount_latest(&fx.server, 2.0).await;
    Mock::given(method("GET"))
        .and(path(crate::helpers::INSTALLER_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&fx.server)
        .await;
    let before = tree(&fx.install_dir());

    let prompter = Arc::new(ScriptedPrompter::new(true, true));
    let events = EventLog::default();
    let orchestrator = fx.orchestrator(
        Arc::new(FakeInstaller::new(InstallerBehavior::Populate)),
        prompter.clone(),
        Arc::new(CountingRelauncher::default()),
        &events,
    );

    let outcome = orchestrator.run().await.unwrap();

    assert!(matches!(
        outcome,
        UpdateOutcome::Failed {
            stage: UpdateStage::Download,
            ..
        }
    ));
    assert_eq!(prompter.asked(), vec!["download"]);
    assert_eq!(tree(&fx.install_dir()), before);
    assert!(is_empty_dir(&fx.dir.path().join("downloads")));
}

#[tokio::test]
async fn shutdown_during_restart_notice_relaunches_immediately() {
    let mut fx = Fixture::new().await;
    fx.config.install.restart_notice_ms = 60_000;
    mount_latest(&fx.server, 2.0).await;
    mount_installer(&fx.server, 1).await;

    let relauncher = Arc::new(CountingRelauncher::default());
    let shutdown = CancellationToken::new();
    let cancel_on_relaunch = shutdown.clone();
    let orchestrator = UpdateOrchestrator::new(
        fx.config.clone(),
        Arc::new(StaticRegistry::single("Gaello", fx.install_dir())),
        Arc::new(FakeInstaller::new(InstallerBehavior::Populate)),
        Arc::new(ScriptedPrompter::new(true, true)),
        relauncher.clone(),
    )
    .with_backup_root(fx.backup_root())
    .with_shutdown(shutdown)
    .with_events(Box::new(move |event| {
        if event == gaello_updater::update::UpdateEvent::PhaseChanged(UpdatePhase::Relaunching) {
            cancel_on_relaunch.cancel();
        }
    }));

    let (outcome, session) = tokio::time::timeout(
        std::time::Duration::from_secs(20),
        orchestrator.run_session(),
    )
    .await
    .expect("restart notice was not cut short")
    .unwrap();

    assert!(matches!(outcome, UpdateOutcome::Installed { relaunched: true, .. }));
    assert!(session.closed_before_timeout);
    assert_eq!(relauncher.launches(), 1);
}

#[tokio::test]
async fn relaunch_failure_still_reports_install() {
    let fx = Fixture::new().await;
    mount_latest(&fx.server, 2.0).await;
    mount_installer(&fx.server, 1).await;

    let prompter = Arc::new(ScriptedPrompter::new(true, true));
    let relauncher = Arc::new(CountingRelauncher {
        fail: true,
        ..CountingRelauncher::default()
    });
    let events = EventLog::default();
    let orchestrator = fx.orchestrator(
        Arc::new(FakeInstaller::new(InstallerBehavior::Populate)),
        prompter.clone(),
        relauncher.clone(),
        &events,
    );

    let outcome = orchestrator.run().await.unwrap();

    assert_eq!(
        outcome,
        UpdateOutcome::Installed {
            version: v(2.0),
            relaunched: false
        }
    );
    assert!(prompter.notices().iter().any(|n| matches!(
        n,
        UpdateNotice::Failed {
            stage: UpdateStage::Relaunch,
            ..
        }
    )));
}

#[cfg(unix)]
#[tokio::test]
async fn failed_swap_and_restore_keeps_snapshot_and_reports_degraded() {
    let fx = Fixture::new().await;
    mount_latest(&fx.server, 2.0).await;
    mount_installer(&fx.server, 1).await;
    let before = tree(&fx.install_dir());

    let installer = Arc::new(FakeInstaller::clobbering(
        InstallerBehavior::Populate,
        fx.install_dir(),
    ));
    let prompter = Arc::new(ScriptedPrompter::new(true, true));
    let relauncher = Arc::new(CountingRelauncher::default());
    let events = EventLog::default();
    let orchestrator = fx.orchestrator(installer, prompter.clone(), relauncher.clone(), &events);

    let outcome = orchestrator.run().await.unwrap();

    match &outcome {
        UpdateOutcome::Failed {
            stage,
            message,
            degraded,
        } => {
            assert_eq!(*stage, UpdateStage::Restore);
            assert!(*degraded);
            assert!(message.contains("could not be restored"), "message: {message}");
        }
        other => panic!("expected degraded failure, got {other:?}"),
    }
    assert!(outcome.to_string().ends_with("(installation degraded)"));
    assert!(events.phases().contains(&UpdatePhase::Restoring));
    assert_eq!(relauncher.launches(), 0);

    let notices = prompter.notices();
    let kept = match notices.as_slice() {
        [UpdateNotice::Degraded {
            backup: Some(backup),
            ..
        }] => backup.clone(),
        other => panic!("expected one degraded notice, got {other:?}"),
    };

    // The preserved snapshot is the only good copy of the old tree.
    assert!(kept.starts_with(fx.backup_root()));
    assert_eq!(tree(&kept), before);
    assert!(
        notices[0]
            .to_string()
            .contains(&kept.display().to_string())
    );
    assert!(!fx.dir.path().join("staging").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn installer_error_with_failed_restore_is_degraded() {
    let fx = Fixture::new().await;
    mount_latest(&fx.server, 2.0).await;
    mount_installer(&fx.server, 1).await;

    let installer = Arc::new(FakeInstaller::clobbering(
        InstallerBehavior::Error,
        fx.install_dir(),
    ));
    let prompter = Arc::new(ScriptedPrompter::new(true, true));
    let events = EventLog::default();
    let orchestrator = fx.orchestrator(
        installer,
        prompter.clone(),
        Arc::new(CountingRelauncher::default()),
        &events,
    );

    let outcome = orchestrator.run().await.unwrap();

    assert!(matches!(
        outcome,
        UpdateOutcome::Failed {
            stage: UpdateStage::Restore,
            degraded: true,
            ..
        }
    ));
    let restores = events
        .phases()
        .into_iter()
        .filter(|p| *p == UpdatePhase::Restoring)
        .count();
    assert_eq!(restores, 1);
    // Cleanup still ran: the snapshot is deleted regardless of the restore.
    assert!(is_empty_dir(&fx.backup_root()));
    assert!(matches!(
        prompter.notices().as_slice(),
        [UpdateNotice::Degraded { backup: None, .. }]
    ));
}
