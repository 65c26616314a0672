use std::fs;
use std::path::PathBuf;

use clap::Parser as _;
use cli::Cli;
use cli::Command;
use config::AppConfig;
use config::Profile;
use framework::asset::asset_path;
use framework::exception;
use framework::exception::CoreRsResult;
use framework::fs::path_buf::PathBufExt as _;
use framework::json;
use framework::log;
use framework::log::LogConfig;
use framework::log::WarningBuffer;
use framework::validate::Validator as _;
use notify::Notifier;
use notify::RunReport;
use tracing::info;

mod ao;
mod archive;
mod cli;
mod config;
mod credential;
mod kpf_guide;
mod metrics;
mod notify;
mod record;
mod rti;
mod sdata;
mod storage;
mod transfer;
mod verify;

pub struct AppState {
    pub config: AppConfig,
    // dev profile, nothing destructive
    pub dev: bool,
    pub warnings: WarningBuffer,
}

impl AppState {
    pub fn profile(&self) -> &Profile {
        self.config.profile(self.dev)
    }
}

#[tokio::main]
async fn main() -> CoreRsResult<()> {
    let cli = Cli::parse();

    let config: AppConfig = json::load_file(&asset_path(cli.conf.as_deref(), "assets/conf.json")?)?;
    config.validate()?;

    let log_dir = cli
        .logdir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.profile(cli.dev).log_dir))
        .into_absolute_path()?;
    fs::create_dir_all(&log_dir).map_err(|err| {
        exception!(
            message = format!("failed to create log dir, dir={}", log_dir.display()),
            source = err
        )
    })?;
    let handle = log::init(LogConfig {
        name: log_name(&cli.command),
        log_dir: Some(&log_dir),
    })?;
    if let Some(ref log_file) = handle.log_file {
        info!(log_file = %log_file.display(), dev = cli.dev, "scrubber started");
    }

    let state = AppState {
        config,
        dev: cli.dev,
        warnings: handle.warnings,
    };

    match cli.command {
        Command::Rti(ref args) => {
            for inst in args.target.instruments(&state.config) {
                run_action(&state, "rti", rti::report_name(&inst), rti::run(&state, &inst, args)).await;
            }
        }
        Command::Sdata(ref args) => {
            for inst in args.target.instruments(&state.config) {
                run_action(&state, "sdata", sdata::report_name(&inst), sdata::run(&state, &inst, args)).await;
            }
        }
        Command::Ao(ref args) => {
            run_action(&state, "ao", ao::report_name(), ao::run(&state, args)).await;
        }
        Command::KpfGuide(ref args) => {
            run_action(&state, "kpf-guide", kpf_guide::report_name(), kpf_guide::run(&state, args)).await;
        }
    }

    Ok(())
}

fn log_name(command: &Command) -> &'static str {
    match command {
        Command::Rti(_) => "rti_scrubber",
        Command::Sdata(_) => "sdata_scrubber",
        Command::Ao(_) => "ao_nightly_dir",
        Command::KpfGuide(_) => "kpf_guide_scrubber",
    }
}

// a failed workflow still mails whatever warnings it logged
async fn run_action<F>(state: &AppState, action: &str, name: String, task: F)
where
    F: Future<Output = CoreRsResult<RunReport>>,
{
    let mut report = None;
    log::start_action(action, async {
        report = Some(task.await?);
        Ok(())
    })
    .await;

    let report = report.unwrap_or_else(|| RunReport::warnings_only(name));
    Notifier::new(&state.config.email)
        .write_emails(&report, &state.warnings)
        .await;
}
