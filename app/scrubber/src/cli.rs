use std::path::PathBuf;

use chrono::Days;
use chrono::NaiveDate;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use framework::exception::CoreRsResult;
use framework::validation_error;

use crate::config::AppConfig;
use crate::config::Timeframe;

#[derive(Debug, Parser)]
#[command(name = "scrubber", about = "Moves archived observatory data to storage and cleans up the source disks")]
pub struct Cli {
    #[arg(long, global = true, help = "Config file, defaults to assets/conf.json next to the binary")]
    pub conf: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        help = "Use the dev profile, copy instead of move and only log remote deletes"
    )]
    pub dev: bool,
    #[arg(long, global = true, help = "Log directory, defaults to the profile log_dir")]
    pub logdir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Move processed data from the processing disk to long term storage.
    Rti(RtiArgs),
    /// Delete instrument originals that are already on storage.
    Sdata(SdataArgs),
    /// Sync AO nightly directories from the summit to HQ and scrub old ones.
    Ao(AoArgs),
    /// Remove old KPF guider images.
    KpfGuide(KpfGuideArgs),
}

#[derive(Debug, Args)]
pub struct InstrumentArgs {
    #[arg(long, value_delimiter = ',', help = "Instruments to scrub, defaults to every configured instrument")]
    pub inst: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    pub include_inst: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    pub exclude_inst: Vec<String>,
    #[arg(long, help = "Telescope, k1 or k2")]
    pub tel: String,
    #[arg(long, help = "First UT date, YYYY-MM-DD")]
    pub utd: Option<NaiveDate>,
    #[arg(long, help = "Last UT date, YYYY-MM-DD")]
    pub utd2: Option<NaiveDate>,
}

#[derive(Debug, Args)]
pub struct RtiArgs {
    #[command(flatten)]
    pub target: InstrumentArgs,
    #[arg(long, help = "Include records that already have an archive_dir")]
    pub force: bool,
    #[arg(long = "move", help = "Store stage and lev0 files regardless of the mode config")]
    pub move_lev0: bool,
}

#[derive(Debug, Args)]
pub struct SdataArgs {
    #[command(flatten)]
    pub target: InstrumentArgs,
    #[arg(long, help = "Delete even when sdata.remove is off for the instrument")]
    pub remove: bool,
}

#[derive(Debug, Args)]
pub struct AoArgs {
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
    pub tel: u8,
    #[arg(long, value_parser = parse_compact_date, help = "Last night to copy, YYYYMMDD, defaults to today")]
    pub utd: Option<NaiveDate>,
    #[arg(long, help = "Number of nights to copy")]
    pub ncopy: Option<u32>,
    #[arg(long, help = "Number of nights before the copy window to scrub")]
    pub nscrub: Option<u32>,
}

#[derive(Debug, Args)]
pub struct KpfGuideArgs {
    #[arg(long, help = "Guider images created before this date are removed, YYYY-MM-DD")]
    pub utd2: Option<NaiveDate>,
}

impl InstrumentArgs {
    pub fn instruments(&self, config: &AppConfig) -> Vec<String> {
        let mut instruments: Vec<String> = if self.inst.is_empty() {
            config.instruments.storage_disk.keys().cloned().collect()
        } else {
            self.inst.iter().map(|inst| inst.to_uppercase()).collect()
        };
        for inst in &self.include_inst {
            let inst = inst.to_uppercase();
            if !instruments.contains(&inst) {
                instruments.push(inst);
            }
        }
        instruments.retain(|inst| !self.exclude_inst.iter().any(|excluded| excluded.eq_ignore_ascii_case(inst)));
        instruments
    }

    /// Explicit dates win, otherwise the timeframe counts days back from `today`.
    pub fn date_range(&self, timeframe: Timeframe, today: NaiveDate) -> CoreRsResult<(NaiveDate, NaiveDate)> {
        let utd = match self.utd {
            Some(utd) => utd,
            None => days_before(today, timeframe.start)?,
        };
        let utd2 = match self.utd2 {
            Some(utd2) => utd2,
            None => days_before(today, timeframe.end)?,
        };
        if utd > utd2 {
            return Err(validation_error!(message = format!("utd must not be after utd2, utd={utd}, utd2={utd2}")));
        }
        Ok((utd, utd2))
    }
}

pub fn days_before(date: NaiveDate, days: u32) -> CoreRsResult<NaiveDate> {
    date.checked_sub_days(Days::new(u64::from(days)))
        .ok_or_else(|| validation_error!(message = format!("date out of range, date={date}, days={days}")))
}

fn parse_compact_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y%m%d").map_err(|err| format!("expected YYYYMMDD, {err}"))
}
