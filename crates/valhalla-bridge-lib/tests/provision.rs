mod common;

use std::fs;
use std::sync::Arc;
use std::thread;

use common::{
    engine_release_archive, linux_config, FakeArchiveSource, MissingReleaseSource,
    RecordingProgress, ENGINE_VERSION,
};
use tempfile::tempdir;
use valhalla_bridge_lib::{
    CancellationToken, EngineState, Error, ErrorKind, LocalArchiveSource, NoProgress, Platform,
    ProgressSink, Provisioner, SetupOutcome,
};

/// Cancels its token as soon as the first unit of work is reported.
struct CancelOnFirstUnit(CancellationToken);

impl ProgressSink for CancelOnFirstUnit {
    fn task(&self, _name: &str, _total: Option<u64>) {}

    fn worked(&self, _item: &str, _units: u64) {
        self.0.cancel();
    }
}

#[test]
fn empty_cache_needs_setup() -> valhalla_bridge_lib::Result<()> {
    let dir = tempdir()?;
    let provisioner = Provisioner::new(
        linux_config(dir.path()),
        Box::new(FakeArchiveSource::new(engine_release_archive())),
    );

    assert!(provisioner.needs_setup());
    assert_eq!(provisioner.state(), EngineState::Unconfigured);
    Ok(())
}

#[test]
fn setup_installs_release_and_records_version() -> valhalla_bridge_lib::Result<()> {
    let dir = tempdir()?;
    let config = linux_config(dir.path());
    let layout = config.layout();
    let source = FakeArchiveSource::new(engine_release_archive());
    let provisioner = Provisioner::new(config, Box::new(source.clone()));
    let progress = RecordingProgress::default();

    let outcome = provisioner.perform_setup(&progress, &CancellationToken::new())?;

    assert_eq!(outcome, SetupOutcome::Installed);
    assert!(!provisioner.needs_setup());
    assert_eq!(provisioner.state(), EngineState::Ready);
    assert_eq!(fs::read_to_string(layout.version_marker())?, ENGINE_VERSION);
    assert!(layout.executable("valhalla_service").is_file());
    assert!(layout.install_dir().join("lib/libvalhalla.so").is_file());
    assert_eq!(
        source.requested_urls(),
        vec![
            "https://releases.test/valhalla-static/releases/download/v3.5.1/valhalla-3.5.1-Linux.tar.gz"
                .to_string()
        ]
    );
    assert_eq!(progress.units(), 4);
    assert_eq!(progress.tasks(), vec!["Installing routing engine".to_string()]);
    Ok(())
}

#[cfg(unix)]
#[test]
fn installed_executables_are_executable() -> valhalla_bridge_lib::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir()?;
    let config = linux_config(dir.path());
    let layout = config.layout();
    let provisioner = Provisioner::new(
        config,
        Box::new(FakeArchiveSource::new(engine_release_archive())),
    );
    provisioner.perform_setup(&NoProgress, &CancellationToken::new())?;

    let service = fs::metadata(layout.executable("valhalla_service"))?;
    assert_eq!(service.permissions().mode() & 0o777, 0o755);
    let library = fs::metadata(layout.install_dir().join("lib/libvalhalla.so"))?;
    assert_eq!(library.permissions().mode() & 0o111, 0);
    Ok(())
}

#[test]
fn second_setup_is_already_current() -> valhalla_bridge_lib::Result<()> {
    let dir = tempdir()?;
    let source = FakeArchiveSource::new(engine_release_archive());
    let provisioner = Provisioner::new(linux_config(dir.path()), Box::new(source.clone()));

    provisioner.perform_setup(&NoProgress, &CancellationToken::new())?;
    let again = provisioner.perform_setup(&NoProgress, &CancellationToken::new())?;

    assert_eq!(again, SetupOutcome::AlreadyCurrent);
    assert_eq!(source.requested_urls().len(), 1);
    Ok(())
}

#[test]
fn concurrent_setups_install_once() -> valhalla_bridge_lib::Result<()> {
    let dir = tempdir()?;
    let source = FakeArchiveSource::new(engine_release_archive());
    let provisioner = Arc::new(Provisioner::new(
        linux_config(dir.path()),
        Box::new(source.clone()),
    ));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let provisioner = Arc::clone(&provisioner);
            thread::spawn(move || provisioner.perform_setup(&NoProgress, &CancellationToken::new()))
        })
        .collect();
    let outcomes: Vec<SetupOutcome> = handles
        .into_iter()
        .map(|handle| handle.join().expect("setup thread panicked"))
        .collect::<valhalla_bridge_lib::Result<_>>()?;

    let installed = outcomes
        .iter()
        .filter(|outcome| **outcome == SetupOutcome::Installed)
        .count();
    assert_eq!(installed, 1);
    assert_eq!(source.requested_urls().len(), 1);
    Ok(())
}

#[test]
fn stale_version_is_replaced() -> valhalla_bridge_lib::Result<()> {
    let dir = tempdir()?;
    let config = linux_config(dir.path());
    let layout = config.layout();

    fs::create_dir_all(layout.executable_dir())?;
    fs::write(layout.executable("valhalla_old_tool"), b"old")?;
    fs::write(layout.version_marker(), "3.4.0")?;

    let provisioner = Provisioner::new(
        config,
        Box::new(FakeArchiveSource::new(engine_release_archive())),
    );
    assert!(provisioner.needs_setup());

    let progress = RecordingProgress::default();
    provisioner.perform_setup(&progress, &CancellationToken::new())?;

    assert!(!layout.executable("valhalla_old_tool").exists());
    assert_eq!(fs::read_to_string(layout.version_marker())?, ENGINE_VERSION);
    assert_eq!(
        progress.tasks(),
        vec![
            "Removing previous routing engine".to_string(),
            "Installing routing engine".to_string()
        ]
    );
    // old tool, marker, bin/, install dir, then four archive entries
    assert_eq!(progress.units(), 8);
    Ok(())
}

#[test]
fn missing_executable_dir_needs_setup() -> valhalla_bridge_lib::Result<()> {
    let dir = tempdir()?;
    let config = linux_config(dir.path());
    let layout = config.layout();
    fs::create_dir_all(layout.install_dir())?;
    fs::write(layout.version_marker(), ENGINE_VERSION)?;

    let provisioner = Provisioner::new(
        config.clone(),
        Box::new(FakeArchiveSource::new(engine_release_archive())),
    );
    assert!(provisioner.needs_setup());

    let windows = Provisioner::new(
        config.with_platform(Platform::Windows),
        Box::new(FakeArchiveSource::new(engine_release_archive())),
    );
    assert!(!windows.needs_setup());
    Ok(())
}

#[test]
fn cancelling_during_removal_leaves_no_marker() -> valhalla_bridge_lib::Result<()> {
    let dir = tempdir()?;
    let config = linux_config(dir.path());
    let layout = config.layout();

    fs::create_dir_all(layout.executable_dir())?;
    for tool in ["valhalla_service", "valhalla_build_tiles", "valhalla_build_admins"] {
        fs::write(layout.executable(tool), b"old")?;
    }

    let source = FakeArchiveSource::new(engine_release_archive());
    let provisioner = Provisioner::new(config, Box::new(source.clone()));
    let cancel = CancellationToken::new();

    let err = provisioner
        .perform_setup(&CancelOnFirstUnit(cancel.clone()), &cancel)
        .unwrap_err();

    assert!(matches!(err, Error::SetupCancelled));
    assert_eq!(err.kind(), ErrorKind::Setup);
    assert!(!layout.version_marker().exists());
    assert!(provisioner.needs_setup());
    assert!(source.requested_urls().is_empty());
    Ok(())
}

#[test]
fn cancelled_before_start_does_nothing() -> valhalla_bridge_lib::Result<()> {
    let dir = tempdir()?;
    let source = FakeArchiveSource::new(engine_release_archive());
    let provisioner = Provisioner::new(linux_config(dir.path()), Box::new(source.clone()));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = provisioner.perform_setup(&NoProgress, &cancel).unwrap_err();
    assert!(matches!(err, Error::SetupCancelled));
    assert!(source.requested_urls().is_empty());
    Ok(())
}

#[test]
fn download_failure_is_a_setup_error() -> valhalla_bridge_lib::Result<()> {
    let dir = tempdir()?;
    let provisioner = Provisioner::new(linux_config(dir.path()), Box::new(MissingReleaseSource));

    let err = provisioner
        .perform_setup(&NoProgress, &CancellationToken::new())
        .unwrap_err();

    assert!(matches!(err, Error::ReleaseDownload { status: 404, .. }));
    assert_eq!(err.kind(), ErrorKind::Setup);
    assert!(provisioner.needs_setup());
    Ok(())
}

#[test]
fn unsupported_platform_fails_setup() -> valhalla_bridge_lib::Result<()> {
    let dir = tempdir()?;
    let config = linux_config(dir.path()).with_platform(Platform::Unsupported("haiku".into()));
    let source = FakeArchiveSource::new(engine_release_archive());
    let provisioner = Provisioner::new(config, Box::new(source.clone()));

    let err = provisioner
        .perform_setup(&NoProgress, &CancellationToken::new())
        .unwrap_err();

    assert!(matches!(err, Error::UnsupportedPlatform { ref os } if os == "haiku"));
    assert!(source.requested_urls().is_empty());
    Ok(())
}

#[test]
fn local_archive_source_installs_offline() -> valhalla_bridge_lib::Result<()> {
    let dir = tempdir()?;
    let archive_path = dir.path().join("valhalla-3.5.1-Linux.tar.gz");
    fs::write(&archive_path, engine_release_archive())?;

    let config = linux_config(&dir.path().join("cache"));
    let layout = config.layout();
    let provisioner = Provisioner::new(config, Box::new(LocalArchiveSource::new(&archive_path)));

    provisioner.perform_setup(&NoProgress, &CancellationToken::new())?;
    assert!(layout.executable("valhalla_service").is_file());
    assert!(!provisioner.needs_setup());
    Ok(())
}
