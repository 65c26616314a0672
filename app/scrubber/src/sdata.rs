use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Local;
use chrono::NaiveDate;
use framework::exception::CoreRsResult;
use framework::fs::tree;
use tracing::info;
use tracing::warn;

use crate::AppState;
use crate::archive::ArchiveClient;
use crate::archive::Search;
use crate::cli::SdataArgs;
use crate::config::AppConfig;
use crate::config::Profile;
use crate::config::TransportKind;
use crate::config::split_columns;
use crate::credential::CredentialResolver;
use crate::metrics::Category;
use crate::metrics::Metrics;
use crate::notify::RunReport;
use crate::record::FileRecord;
use crate::record::Level;
use crate::storage::StorageLayout;
use crate::transfer;
use crate::transfer::DeleteKind;
use crate::transfer::DeleteTask;
use crate::transfer::MountOps;
use crate::transfer::PasswordSshOps;
use crate::transfer::RemoteTransport;
use crate::transfer::SshOps;
use crate::transfer::TransferOutcome;
use crate::verify::ErrorHistogram;
use crate::verify::RecordValidator;
use crate::verify::VerifyError;

pub fn report_name(inst: &str) -> String {
    format!("{inst} SDATA Data Scrubber")
}

struct Settings<'a> {
    inst: &'a str,
    utd: NaiveDate,
    utd2: NaiveDate,
    // off means query and report only
    remove: bool,
    dry_run: bool,
    transport: TransportKind,
    // scrubber view of the instrument host, e.g. /net/kcwiserver
    local_root: PathBuf,
    storage_mount: PathBuf,
    server: &'a str,
    account_stem: &'a str,
}

pub async fn run(state: &AppState, inst: &str, args: &SdataArgs) -> CoreRsResult<RunReport> {
    let config = &state.config;
    config.validate_instrument(inst)?;
    let profile = state.profile();
    let tel = args.target.tel.as_str();
    let timeframe = config.timeframe.for_instrument(Some(inst));
    let (utd, utd2) = args.target.date_range(timeframe, Local::now().date_naive())?;
    let client = ArchiveClient::new(profile.site(tel)?, Duration::from_secs(config.archive.timeout_secs))?;

    let settings = Settings {
        inst,
        utd,
        utd2,
        remove: args.remove || config.sdata.remove.get(inst).copied().unwrap_or(false),
        dry_run: state.dev,
        transport: config.sdata.transport,
        local_root: Path::new(&config.sdata.inst_root).join(config.sdata.inst_disk(inst)?),
        storage_mount: PathBuf::from(&profile.storage_mount),
        server: config.sdata.server(inst)?,
        account_stem: config.sdata.account_stem(inst)?,
    };
    Ok(remove(config, profile, &client, &settings).await)
}

async fn remove(config: &AppConfig, profile: &Profile, client: &ArchiveClient, settings: &Settings<'_>) -> RunReport {
    let inst = settings.inst;
    info!(
        inst,
        utd = %settings.utd,
        utd2 = %settings.utd2,
        remove = settings.remove,
        dry_run = settings.dry_run,
        "remove stored originals"
    );

    let mut metrics = Metrics::default();
    let mut errors = ErrorHistogram::default();
    let layout = StorageLayout::new(config, profile);
    let records = query(config, client, &layout, settings, &mut metrics, &mut errors).await;

    let source_dir = records
        .first()
        .and_then(|record| record.ofname())
        .and_then(|ofname| local_path(&settings.local_root, ofname).parent().map(Path::to_path_buf));
    if let Some(ref dir) = source_dir {
        metrics.source.before = Some(tree::count_files(dir));
    }

    if !settings.remove {
        info!(inst, "removal is disabled for instrument, nothing deleted");
    } else if records.is_empty() {
        info!(inst, "no files found to remove");
    } else {
        let credentials = CredentialResolver::new(
            settings.account_stem,
            config.sdata.fixed_accounts.get(inst).map(String::as_str),
            &config.passwords,
            config.passwords.suffix.get(inst).map(String::as_str),
        );
        let companion_dirs = config.sdata.companion_dirs.get(inst).map(Vec::as_slice).unwrap_or_default();
        let path_exclude = config.sdata.path_exclude.get(inst).map(String::as_str);
        for record in &records {
            let (Some(koaid), Some(ofname)) = (record.koaid(), record.ofname()) else {
                continue;
            };
            if let Some(exclude) = path_exclude
                && ofname.contains(exclude)
            {
                info!(koaid, "path excluded from removal, ofname={ofname}");
                continue;
            }
            let outcome = remove_file(settings, &credentials, companion_dirs, koaid, ofname).await;
            metrics.record(Category::Sdata, outcome);
            if outcome.is_moved() {
                if settings.dry_run {
                    info!(koaid, "dev mode, source_deleted not set");
                } else {
                    client.mark_deleted(koaid).await;
                }
            }
        }
    }

    if let Some(ref dir) = source_dir {
        metrics.source.after = Some(tree::count_files(dir));
    }
    metrics.undeleted_files = client
        .count_undeleted(&config.db_columns.deleted, settings.utd, settings.utd2)
        .await;
    let report = metrics.report(&format!("SDATA Scrubber Report: {inst}"), settings.utd, settings.utd2);
    info!("{report}");

    RunReport {
        name: report_name(inst),
        report: Some(report),
        errors,
    }
}

async fn query(
    config: &AppConfig,
    client: &ArchiveClient,
    layout: &StorageLayout<'_>,
    settings: &Settings<'_>,
    metrics: &mut Metrics,
    errors: &mut ErrorHistogram,
) -> Vec<FileRecord> {
    let not_deleted = format!("{} IS NULL", config.db_columns.deleted);
    let columns = config.db_columns.sdata.as_str();
    let found = client
        .search(&Search {
            columns: Some(columns),
            key: Some(config.db_columns.status.as_str()),
            val: Some(config.archive.archived.as_str()),
            add: Some(not_deleted.as_str()),
            utd: Some(settings.utd),
            utd2: Some(settings.utd2),
            inst: Some(settings.inst),
            level: None,
        })
        .await;
    let returned = found.len();

    // an original is only removed once its staged copy reached storage
    let mut stored = Vec::with_capacity(returned);
    for record in found {
        if is_stored(layout, &settings.storage_mount, &record) {
            stored.push(record);
        } else {
            errors.record(VerifyError::NotStored, record.koaid().unwrap_or_default());
        }
    }

    let validator =
        RecordValidator::new(&config.archive.archived, &config.db_columns.status).exempt(&config.db_columns.deleted);
    let (valid, verify_errors) = validator.verify(stored, &split_columns(columns));
    info!(inst = settings.inst, returned, valid = valid.len(), "archive results verified");
    errors.merge(verify_errors);
    metrics.candidates(Category::Sdata, returned, valid.len());
    valid
}

// the stored copy may have been gzipped, a file starting with the original name is enough
fn is_stored(layout: &StorageLayout<'_>, storage_mount: &Path, record: &FileRecord) -> bool {
    let (Some(koaid), Some(ofname)) = (record.koaid(), record.ofname()) else {
        warn!("ERROR: koaid or ofname missing, record={}", serde_json::to_string(record).unwrap_or_default());
        return false;
    };
    let Some(storage_dir) = layout.destination_for(record, Level::Stage) else {
        warn!(koaid, "ERROR: could not determine stage storage path, ofname={ofname}");
        return false;
    };
    let filename = ofname.rsplit_once('/').map_or(ofname, |(_, filename)| filename);
    let dir = storage_mount.join(storage_dir.trim_start_matches('/'));
    let stored = fs::read_dir(&dir).is_ok_and(|entries| {
        entries
            .flatten()
            .any(|entry| entry.file_name().to_string_lossy().starts_with(filename))
    });
    if !stored {
        warn!(koaid, "ERROR: data not on storage, dir={}, file={filename}", dir.display());
    }
    stored
}

async fn remove_file(
    settings: &Settings<'_>,
    credentials: &CredentialResolver<'_>,
    companion_dirs: &[String],
    koaid: &str,
    ofname: &str,
) -> TransferOutcome {
    let remote = remote_path(ofname);
    let transport = match transport(settings, credentials, remote) {
        Ok(transport) => transport,
        Err(e) => {
            warn!(koaid, "skipping, {}", e.message);
            return TransferOutcome::Failed;
        }
    };

    let local = local_path(&settings.local_root, ofname);
    if let (Some(local_dir), Some((remote_dir, _))) = (local.parent(), remote.rsplit_once('/')) {
        for companion in companion_dirs {
            let task = DeleteTask {
                local: local_dir.join(companion),
                remote: format!("{remote_dir}/{companion}"),
                kind: DeleteKind::Recursive,
            };
            transfer::delete(&transport, &task).await;
        }
    }

    info!(koaid, "remove original, path={remote}");
    transfer::delete(
        &transport,
        &DeleteTask {
            local,
            remote: remote.to_owned(),
            kind: DeleteKind::File,
        },
    )
    .await
}

fn transport(settings: &Settings<'_>, credentials: &CredentialResolver<'_>, remote: &str) -> CoreRsResult<RemoteTransport> {
    let transport = match settings.transport {
        TransportKind::Mount => RemoteTransport::Mount(MountOps::new(&settings.local_root, settings.dry_run)),
        TransportKind::SshKey => {
            let account = credentials.account(remote)?;
            RemoteTransport::SshKey(SshOps::new(&account, settings.server, settings.dry_run))
        }
        TransportKind::Password => {
            let account = credentials.account(remote)?;
            let password = credentials.password(&account)?;
            RemoteTransport::Password(PasswordSshOps::new(&account, settings.server, password, settings.dry_run))
        }
    };
    Ok(transport)
}

// /s/sdata1400/kcwi1/2021jan16/kb.fits -> /sdata1400/kcwi1/2021jan16/kb.fits
fn remote_path(ofname: &str) -> &str {
    ofname
        .strip_prefix("/s")
        .filter(|path| path.starts_with('/'))
        .unwrap_or(ofname)
}

fn local_path(local_root: &Path, ofname: &str) -> PathBuf {
    local_root.join(remote_path(ofname).trim_start_matches('/'))
}
