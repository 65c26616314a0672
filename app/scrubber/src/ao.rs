use std::path::Path;
use std::path::PathBuf;

use chrono::Local;
use chrono::NaiveDate;
use framework::exception::CoreRsResult;
use framework::fs::tree;
use framework::validation_error;
use tracing::info;
use tracing::warn;

use crate::AppState;
use crate::cli::AoArgs;
use crate::cli::days_before;
use crate::config::AoConfig;
use crate::notify::RunReport;
use crate::transfer::DeleteKind;
use crate::transfer::RemoteFileOps;
use crate::transfer::RsyncFilter;
use crate::transfer::SshOps;
use crate::transfer::TransferExecutor;
use crate::transfer::TransferMode;
use crate::transfer::TransferOutcome;
use crate::transfer::TransferTask;

pub fn report_name() -> String {
    "AO Nightly Directory Scrubber".to_owned()
}

struct Settings {
    tel: String,
    utd: NaiveDate,
    ncopy: u32,
    nscrub: u32,
    dry_run: bool,
    // template paths hang off this, "/" outside of tests
    root: PathBuf,
}

impl Settings {
    // [utd - (ncopy - 1), utd]
    fn copy_start(&self) -> CoreRsResult<NaiveDate> {
        days_before(self.utd, self.ncopy.saturating_sub(1))
    }
}

pub async fn run(state: &AppState, args: &AoArgs) -> CoreRsResult<RunReport> {
    let config = &state.config.ao;
    let settings = Settings {
        tel: args.tel.to_string(),
        utd: args.utd.unwrap_or_else(|| Local::now().date_naive()),
        ncopy: args.ncopy.unwrap_or(config.ncopy),
        nscrub: args.nscrub.unwrap_or(config.nscrub),
        dry_run: state.dev,
        root: PathBuf::from("/"),
    };
    if settings.ncopy == 0 {
        return Err(validation_error!(message = "ncopy must be at least one night"));
    }
    let user = render(&config.user, &settings.tel);
    let server = render(&config.server, &settings.tel);
    let summit = SshOps::new(&user, &server, settings.dry_run);
    sync(config, &settings, &summit).await?;
    Ok(RunReport::warnings_only(report_name()))
}

async fn sync<R>(config: &AoConfig, settings: &Settings, summit: &R) -> CoreRsResult<()>
where
    R: RemoteFileOps,
{
    let copy_start = settings.copy_start()?;
    let scrub_start = days_before(copy_start, settings.nscrub)?;
    info!(
        tel = %settings.tel,
        "ao nightly sync, copy={copy_start} to {}, scrub={scrub_start} to {copy_start}",
        settings.utd
    );

    let hq_root = settings.root.join(trim(&hq_root(&config.hq_path, &settings.tel)));
    let mut executor = TransferExecutor::new(hq_root);

    for date in copy_start.iter_days().take_while(|date| *date <= settings.utd) {
        info!(%date, "copy nightly directory");
        let paths = NightlyPaths::new(config, settings, date);
        paths.sync(&mut executor, TransferMode::Copy).await;
    }

    // dev mode leaves the summit untouched
    let mode = if settings.dry_run {
        TransferMode::Copy
    } else {
        TransferMode::Move
    };
    for date in scrub_start.iter_days().take_while(|date| *date < copy_start) {
        info!(%date, "scrub nightly directory");
        let paths = NightlyPaths::new(config, settings, date);
        if paths.sync(&mut executor, mode).await.is_moved() && mode == TransferMode::Move {
            paths.clean_summit(summit).await;
        }
    }
    Ok(())
}

struct NightlyPaths {
    date: NaiveDate,
    // summit host view, also used as the remote path
    summit_remote: String,
    summit: PathBuf,
    hq: PathBuf,
}

impl NightlyPaths {
    fn new(config: &AoConfig, settings: &Settings, date: NaiveDate) -> Self {
        let date_path = date.format("%y/%m/%d").to_string();
        let summit_remote = render(&config.summit_path, &settings.tel).replace("{date}", &date_path);
        let hq = render(&config.hq_path, &settings.tel).replace("{date}", &date_path);
        NightlyPaths {
            date,
            summit: settings.root.join(trim(&summit_remote)),
            summit_remote,
            hq: settings.root.join(trim(&hq)),
        }
    }

    async fn sync(&self, executor: &mut TransferExecutor, mode: TransferMode) -> TransferOutcome {
        if !self.summit.is_dir() {
            info!(path = %self.summit.display(), "already cleaned");
            return TransferOutcome::SkippedMissing;
        }
        let summit_count = tree::count_files(&self.summit);
        let outcome = executor
            .transfer(&TransferTask {
                source: self.summit.clone(),
                destination: self.hq.clone(),
                mode,
                filter: RsyncFilter::All,
            })
            .await;
        if outcome == TransferOutcome::Failed {
            warn!(date = %self.date, "error syncing files, check paths");
            return outcome;
        }

        let hq_count = tree::count_files(&self.hq);
        info!(date = %self.date, summit_count, hq_count, "file count");
        if summit_count > hq_count {
            warn!(
                "the file count at the summit is greater than at HQ after sync, utd={}",
                self.date.format("%Y%m%d")
            );
        }
        outcome
    }

    // the date directory belongs to the summit account, the month one is removed locally once empty
    async fn clean_summit<R>(&self, summit: &R)
    where
        R: RemoteFileOps,
    {
        if let Err(e) = summit.delete(&self.summit_remote, DeleteKind::EmptyDir).await {
            warn!(path = %self.summit_remote, "failed to remove summit directory, error={}", e.message);
        }
        if let Some(month) = self.summit.parent() {
            tree::remove_dir_if_empty(month);
        }
    }
}

fn render(template: &str, tel: &str) -> String {
    template.replace("{tel}", tel)
}

// /h/nightly{tel}/ao/{date}/ -> /h/nightly1/ao/
fn hq_root(hq_path: &str, tel: &str) -> String {
    let base = hq_path.split_once("{date}").map_or(hq_path, |(base, _)| base);
    render(base, tel)
}

fn trim(path: &str) -> &Path {
    Path::new(path.trim_start_matches('/'))
}
