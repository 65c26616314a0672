use std::path::PathBuf;
use std::time::Duration;

use chrono::Local;
use chrono::NaiveDate;
use framework::exception::CoreRsResult;
use framework::fs::tree;
use indexmap::IndexMap;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::AppState;
use crate::archive::ArchiveClient;
use crate::archive::Search;
use crate::cli::RtiArgs;
use crate::config::AppConfig;
use crate::config::Profile;
use crate::config::split_columns;
use crate::metrics::Category;
use crate::metrics::Metrics;
use crate::notify::RunReport;
use crate::record::FileRecord;
use crate::record::Level;
use crate::storage::StorageLayout;
use crate::transfer::RemoteFileOps;
use crate::transfer::RsyncFilter;
use crate::transfer::SshOps;
use crate::transfer::TransferExecutor;
use crate::transfer::TransferMode;
use crate::transfer::TransferOutcome;
use crate::transfer::TransferTask;
use crate::verify::ErrorHistogram;
use crate::verify::RecordValidator;
use crate::verify::StagedCopyPolicy;

pub fn report_name(inst: &str) -> String {
    format!("{inst} RTI Data Scrubber")
}

struct Settings<'a> {
    inst: &'a str,
    tel: &'a str,
    utd: NaiveDate,
    utd2: NaiveDate,
    // Lev0 covers the stage files as well
    levels: Vec<Level>,
    force: bool,
    mode: TransferMode,
    // record paths hang off this, "/" outside of tests
    source_root: PathBuf,
    storage_mount: PathBuf,
    // storage server view, e.g. /koastorage04/KCWI
    storage_dir: String,
}

pub async fn run(state: &AppState, inst: &str, args: &RtiArgs) -> CoreRsResult<RunReport> {
    let config = &state.config;
    config.validate_instrument(inst)?;
    let profile = state.profile();
    let tel = args.target.tel.as_str();
    let timeframe = config.timeframe.for_instrument(Some(inst));
    let (utd, utd2) = args.target.date_range(timeframe, Local::now().date_naive())?;
    let client = ArchiveClient::new(profile.site(tel)?, Duration::from_secs(config.archive.timeout_secs))?;

    let mut levels = vec![];
    if config.mode.move_lev0 || args.move_lev0 {
        levels.push(Level::Lev0);
    }
    if config.mode.lev1 {
        levels.push(Level::Lev1);
    }
    if config.mode.lev2 {
        levels.push(Level::Lev2);
    }

    let settings = Settings {
        inst,
        tel,
        utd,
        utd2,
        levels,
        force: args.force,
        mode: if state.dev { TransferMode::Copy } else { TransferMode::Move },
        source_root: PathBuf::from("/"),
        storage_mount: PathBuf::from(&profile.storage_mount),
        storage_dir: format!("{}{}/{inst}", profile.storage_root, config.instruments.storage_disk(inst)?),
    };
    let storage = SshOps::new(&profile.user, &profile.store_server, state.dev);
    let (metrics, errors) = store(config, profile, &client, &storage, &settings).await;
    Ok(report(settings.inst, settings.utd, settings.utd2, &metrics, errors))
}

async fn store<R>(
    config: &AppConfig,
    profile: &Profile,
    client: &ArchiveClient,
    storage: &R,
    settings: &Settings<'_>,
) -> (Metrics, ErrorHistogram)
where
    R: RemoteFileOps,
{
    let inst = settings.inst;
    info!(
        inst,
        utd = %settings.utd,
        utd2 = %settings.utd2,
        levels = ?settings.levels,
        mode = ?settings.mode,
        "store processed files"
    );

    let mut metrics = Metrics::default();
    let mut errors = ErrorHistogram::default();
    let records = query(config, client, settings, &mut metrics, &mut errors).await;

    let files_root = settings
        .source_root
        .join(format!("{}{}", settings.tel, profile.files_root.trim_matches('/')));
    let source_dirs = [files_root.join(inst), files_root.join("stage").join(inst)];
    metrics.source.before = Some(count_source(&source_dirs));
    metrics.storage.before = count_storage(storage, &settings.storage_dir).await;

    let mut run = Store {
        client,
        layout: StorageLayout::new(config, profile),
        executor: TransferExecutor::new(&settings.storage_mount),
        settings,
        archive_column: &config.db_columns.archive_directory,
        exact_koaid: config.instruments.exact_koaid_filter.iter().any(|name| name == inst),
        metrics,
    };
    if let Some(records) = records.get(&Level::Lev0) {
        let stored = run.lev0(records).await;
        if let Some(component_dirs) = config.instruments.component_dirs.get(inst) {
            run.components(component_dirs, stored).await;
        }
    }
    if let Some(records) = records.get(&Level::Stage) {
        run.stage(records).await;
    }
    for level in [Level::Lev1, Level::Lev2] {
        if let Some(records) = records.get(&level) {
            run.processed(level, records).await;
        }
    }
    let mut metrics = run.metrics;

    if settings.mode == TransferMode::Move {
        for dir in &source_dirs {
            tree::prune_empty_dirs(dir);
        }
    }
    metrics.source.after = Some(count_source(&source_dirs));
    metrics.storage.after = count_storage(storage, &settings.storage_dir).await;
    metrics.undeleted_files = client
        .count_undeleted(&config.db_columns.deleted, settings.utd, settings.utd2)
        .await;
    (metrics, errors)
}

// the report is only sent when source and storage disagree
fn report(inst: &str, utd: NaiveDate, utd2: NaiveDate, metrics: &Metrics, errors: ErrorHistogram) -> RunReport {
    let report = metrics.report(&format!("RTI Scrubber Report: {inst}"), utd, utd2);
    info!("{report}");
    let report = if metrics.reconciled() {
        info!("source and storage deltas match, report not sent");
        None
    } else {
        Some(report)
    };

    RunReport {
        name: report_name(inst),
        report,
        errors,
    }
}

async fn query(
    config: &AppConfig,
    client: &ArchiveClient,
    settings: &Settings<'_>,
    metrics: &mut Metrics,
    errors: &mut ErrorHistogram,
) -> IndexMap<Level, Vec<FileRecord>> {
    // a staged copy only has to exist when it is about to be moved away
    let staged_copy = if settings.mode == TransferMode::Move && !settings.force {
        StagedCopyPolicy::Required {
            root: settings.source_root.join(settings.tel).display().to_string(),
        }
    } else {
        StagedCopyPolicy::Disabled
    };
    let validator = RecordValidator::new(&config.archive.archived, &config.db_columns.status).staged_copy(staged_copy);
    let not_migrated = format!("{} IS NULL", config.db_columns.archive_directory);
    let add = (!settings.force).then_some(not_migrated.as_str());

    let mut records = IndexMap::new();
    for &level in &settings.levels {
        let columns = config.db_columns.for_level(level);
        let lev0 = level == Level::Lev0;
        let found = client
            .search(&Search {
                columns: Some(columns),
                key: lev0.then_some(config.db_columns.status.as_str()),
                val: lev0.then_some(config.archive.archived.as_str()),
                add,
                utd: Some(settings.utd),
                utd2: Some(settings.utd2),
                inst: Some(settings.inst),
                level: (!lev0).then_some(level.number()),
            })
            .await;

        let returned = found.len();
        let (valid, level_errors) = validator.verify(found, &split_columns(columns));
        info!(inst = settings.inst, %level, returned, valid = valid.len(), "archive results verified");
        errors.merge(level_errors);
        metrics.candidates(Category::from(level), returned, valid.len());
        if lev0 {
            metrics.candidates(Category::Stage, returned, valid.len());
            records.insert(Level::Stage, valid.clone());
        }
        records.insert(level, valid);
    }
    records
}

struct Store<'a> {
    client: &'a ArchiveClient,
    layout: StorageLayout<'a>,
    executor: TransferExecutor,
    settings: &'a Settings<'a>,
    archive_column: &'a str,
    exact_koaid: bool,
    metrics: Metrics,
}

impl Store<'_> {
    // /koadata/KCWI/20210116/lev0 -> /k1koadata/KCWI/20210116/lev0
    fn source(&self, path: &str) -> PathBuf {
        self.settings
            .source_root
            .join(format!("{}{}", self.settings.tel, path.trim_matches('/')))
    }

    fn destination(&self, storage_dir: &str) -> PathBuf {
        self.settings.storage_mount.join(storage_dir.trim_start_matches('/'))
    }

    // returns source -> destination of every lev0 directory something was stored from
    async fn lev0(&mut self, records: &[FileRecord]) -> IndexMap<PathBuf, PathBuf> {
        let mut stored = IndexMap::new();
        for record in records {
            let (Some(koaid), Some(process_dir)) = (record.koaid(), record.process_dir()) else {
                continue;
            };
            let Some(storage_dir) = self.layout.processed_destination(koaid, Level::Lev0) else {
                warn!(koaid, "could not determine storage path, files at {process_dir} not moved");
                self.metrics.record(Category::Lev0, TransferOutcome::Failed);
                continue;
            };
            // KB.20210116.57436.94. must not pick up KB.20210116.57436.940
            let prefix = if self.exact_koaid {
                koaid.to_owned()
            } else {
                format!("{koaid}.")
            };
            info!(koaid, "store lev0, storage_dir={storage_dir}");
            let task = TransferTask {
                source: self.source(process_dir),
                destination: self.destination(&storage_dir),
                mode: self.settings.mode,
                filter: RsyncFilter::Prefix(prefix),
            };
            let outcome = self.executor.transfer(&task).await;
            self.metrics.record(Category::Lev0, outcome);
            if outcome.is_moved() {
                stored.insert(task.source, task.destination);
            }
        }
        stored
    }

    async fn components(&mut self, component_dirs: &[String], stored: IndexMap<PathBuf, PathBuf>) {
        for (source, destination) in stored {
            for component in component_dirs {
                let task = TransferTask {
                    source: source.join(component),
                    destination: destination.join(component),
                    mode: TransferMode::Copy,
                    filter: RsyncFilter::Fits,
                };
                let outcome = self.executor.transfer(&task).await;
                debug!(component, source = %task.source.display(), ?outcome, "component directory");
            }
        }
    }

    async fn stage(&mut self, records: &[FileRecord]) {
        for record in records {
            let (Some(koaid), Some(stage_file)) = (record.koaid(), record.stage_file()) else {
                continue;
            };
            let Some(storage_dir) = self.layout.destination_for(record, Level::Stage) else {
                warn!(
                    koaid,
                    "could not determine stage storage path, ofname={}",
                    record.ofname().unwrap_or_default()
                );
                self.metrics.record(Category::Stage, TransferOutcome::Failed);
                continue;
            };
            info!(koaid, "store stage file, storage_dir={storage_dir}");
            let outcome = self
                .executor
                .transfer(&TransferTask {
                    source: self.source(stage_file),
                    destination: self.destination(&storage_dir),
                    mode: self.settings.mode,
                    filter: RsyncFilter::All,
                })
                .await;
            self.metrics.record(Category::Stage, outcome);
            if outcome.is_moved() {
                self.client
                    .mark_archived(self.archive_column, koaid, &storage_dir, Level::Stage.number())
                    .await;
            }
        }
    }

    // lev1/lev2 products of a night share one directory, it is synced once
    async fn processed(&mut self, level: Level, records: &[FileRecord]) {
        let category = Category::from(level);
        let mut synced: IndexMap<PathBuf, TransferOutcome> = IndexMap::new();
        for record in records {
            let (Some(koaid), Some(process_dir)) = (record.koaid(), record.process_dir()) else {
                continue;
            };
            if !process_dir.contains(level.dir_name().as_str()) {
                warn!(koaid, "{level} path format is incorrect, path={process_dir}");
                continue;
            }
            let Some(storage_dir) = self.layout.processed_destination(koaid, level) else {
                warn!(koaid, "could not determine storage path, files at {process_dir} not moved");
                self.metrics.record(category, TransferOutcome::Failed);
                continue;
            };

            let source = self.source(process_dir);
            let outcome = match synced.get(&source).copied() {
                Some(outcome) => outcome,
                None => {
                    info!(koaid, "store {level}, storage_dir={storage_dir}");
                    let outcome = self
                        .executor
                        .transfer(&TransferTask {
                            source: source.clone(),
                            destination: self.destination(&storage_dir),
                            mode: self.settings.mode,
                            filter: RsyncFilter::All,
                        })
                        .await;
                    self.metrics.record(category, outcome);
                    synced.insert(source, outcome);
                    outcome
                }
            };
            if outcome.is_moved() {
                self.client
                    .mark_archived(self.archive_column, koaid, &storage_dir, level.number())
                    .await;
            }
        }
    }
}

fn count_source(dirs: &[PathBuf]) -> u64 {
    dirs.iter().map(|dir| tree::count_files(dir)).sum()
}

async fn count_storage<R>(storage: &R, dir: &str) -> Option<u64>
where
    R: RemoteFileOps,
{
    match storage.count_files(dir).await {
        Ok(count) => Some(count),
        Err(e) => {
            warn!("failed to count storage files, dir={dir}, error={}", e.message);
            None
        }
    }
}
