use std::fs;
use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Local;
use chrono::NaiveDate;
use framework::exception::CoreRsResult;
use tracing::error;
use tracing::info;
use tracing::warn;
use walkdir::WalkDir;

use crate::AppState;
use crate::cli::KpfGuideArgs;
use crate::cli::days_before;
use crate::config::AppConfig;
use crate::config::TransportKind;
use crate::credential::CredentialResolver;
use crate::notify::RunReport;
use crate::transfer;
use crate::transfer::DeleteKind;
use crate::transfer::DeleteTask;
use crate::transfer::MountOps;
use crate::transfer::PasswordSshOps;
use crate::transfer::RemoteFileOps;
use crate::transfer::RemoteTransport;
use crate::transfer::SshOps;
use crate::transfer::TransferOutcome;

const INSTRUMENT: &str = "KPF";

pub fn report_name() -> String {
    "KPF GUIDE SDATA Data Scrubber".to_owned()
}

pub async fn run(state: &AppState, args: &KpfGuideArgs) -> CoreRsResult<RunReport> {
    let config = &state.config;
    let utd2 = match args.utd2 {
        Some(utd2) => utd2,
        None => days_before(
            Local::now().date_naive(),
            config.timeframe.for_instrument(Some(INSTRUMENT)).end,
        )?,
    };
    let dir = Path::new(&config.kpf_guide.dir);
    info!(utd2 = %utd2, dir = %dir.display(), "scrub guider images");

    let transport = transport(config, state.dev)?;
    let (removed, expected) = scrub(&transport, dir, utd2, state.dev).await;

    let report = (removed != expected).then(|| {
        format!(
            "The count from the KPF Guide Scrubber does not match, expected to be deleted: {expected}, actually deleted: {removed}"
        )
    });
    Ok(RunReport {
        report,
        ..RunReport::warnings_only(report_name())
    })
}

fn transport(config: &AppConfig, dry_run: bool) -> CoreRsResult<RemoteTransport> {
    let guide = &config.kpf_guide;
    let transport = match guide.transport {
        TransportKind::Mount => RemoteTransport::Mount(MountOps::new("/", dry_run)),
        TransportKind::SshKey => RemoteTransport::SshKey(SshOps::new(&guide.account, &guide.server, dry_run)),
        TransportKind::Password => {
            let credentials = CredentialResolver::new(
                INSTRUMENT,
                Some(&guide.account),
                &config.passwords,
                config.passwords.suffix.get(INSTRUMENT).map(String::as_str),
            );
            let password = credentials.eng_password(&guide.account)?;
            RemoteTransport::Password(PasswordSshOps::new(&guide.account, &guide.server, password, dry_run))
        }
    };
    Ok(transport)
}

// returns (removed, expected)
async fn scrub<R>(ops: &R, dir: &Path, utd2: NaiveDate, dry_run: bool) -> (u64, u64)
where
    R: RemoteFileOps,
{
    let mut removed = 0;
    let mut expected = 0;
    for path in guider_images(dir, utd2) {
        expected += 1;
        let task = DeleteTask {
            remote: path.display().to_string(),
            local: path,
            kind: DeleteKind::File,
        };
        match transfer::delete(ops, &task).await {
            TransferOutcome::Moved if dry_run => removed += 1,
            TransferOutcome::Moved => {
                // verified through the local mount
                if task.local.exists() {
                    error!(path = %task.local.display(), "file not removed, check path");
                } else {
                    removed += 1;
                }
            }
            TransferOutcome::SkippedMissing | TransferOutcome::Failed => {}
        }
    }
    info!(removed, expected, "guider images removed");
    (removed, expected)
}

// .fits files created before utd2, creation falls back to modification time where the fs has none
fn guider_images(dir: &Path, utd2: NaiveDate) -> Vec<PathBuf> {
    let mut images = vec![];
    for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() || !entry.file_name().to_string_lossy().contains(".fits") {
            continue;
        }
        let created = fs::metadata(entry.path()).and_then(|metadata| metadata.created().or_else(|_| metadata.modified()));
        match created {
            Ok(created) if DateTime::<Local>::from(created).date_naive() < utd2 => images.push(entry.into_path()),
            Ok(_) => {}
            Err(err) => warn!(path = %entry.path().display(), "error getting time, error={err}"),
        }
    }
    images
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::Days;
    use chrono::Local;

    use crate::config::TransportKind;
    use crate::config::tests::config;
    use crate::transfer::MountOps;
    use crate::transfer::RemoteTransport;

    #[test]
    fn transport_from_guide_config() {
        let mut config = config();
        config.sdata.transport = TransportKind::Password;

        config.kpf_guide.transport = TransportKind::Mount;
        let transport = super::transport(&config, true).unwrap();
        assert!(matches!(transport, RemoteTransport::Mount(_)));

        config.kpf_guide.transport = TransportKind::SshKey;
        let transport = super::transport(&config, true).unwrap();
        assert!(matches!(transport, RemoteTransport::SshKey(_)));
    }

    #[tokio::test]
    async fn scrub() {
        let dir = tempfile::tempdir().unwrap();
        let guide = dir.path().join("kpfguide/20240301");
        fs::create_dir_all(&guide).unwrap();
        fs::write(guide.join("kpfguide_0001.fits"), b"guide").unwrap();
        fs::write(guide.join("kpfguide_0002.fits.gz"), b"guide").unwrap();
        fs::write(guide.join("kpfguide.log"), b"log").unwrap();
        let ops = MountOps::new("/", false);
        let today = Local::now().date_naive();

        let counts = super::scrub(&ops, dir.path(), today, false).await;
        assert_eq!(counts, (0, 0));

        let tomorrow = today.checked_add_days(Days::new(1)).unwrap();
        let counts = super::scrub(&ops, dir.path(), tomorrow, false).await;
        assert_eq!(counts, (2, 2));
        assert!(!guide.join("kpfguide_0001.fits").exists());
        assert!(!guide.join("kpfguide_0002.fits.gz").exists());
        assert!(guide.join("kpfguide.log").exists());
    }

    #[tokio::test]
    async fn dev_mode_only_logs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("kpfguide_0001.fits"), b"guide").unwrap();
        let ops = MountOps::new("/", true);
        let tomorrow = Local::now().date_naive().checked_add_days(Days::new(1)).unwrap();

        let counts = super::scrub(&ops, dir.path(), tomorrow, true).await;

        assert_eq!(counts, (1, 1));
        assert!(dir.path().join("kpfguide_0001.fits").exists());
    }
}
