use framework::config_error;
use framework::exception::CoreRsResult;
use framework::validate::Validator;
use framework::validate::not_blank;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::record::Level;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub profiles: Profiles,
    pub archive: ArchiveConfig,
    pub db_columns: DbColumns,
    pub mode: ModeConfig,
    pub instruments: InstrumentConfig,
    pub sdata: SdataConfig,
    pub passwords: PasswordConfig,
    pub email: EmailConfig,
    pub ao: AoConfig,
    pub kpf_guide: KpfGuideConfig,
    pub timeframe: TimeframeConfig,
}

#[derive(Debug, Deserialize)]
pub struct Profiles {
    pub default: Profile,
    pub dev: Profile,
}

#[derive(Debug, Deserialize)]
pub struct Profile {
    // telescope (k1, k2) -> archive api url
    pub sites: IndexMap<String, String>,
    pub user: String,
    pub store_server: String,
    pub storage_root: String,
    pub storage_mount: String,
    // local processed data root, prefixed with the telescope, /koadata -> /k1koadata
    pub files_root: String,
    pub log_dir: String,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveConfig {
    pub archived: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize)]
pub struct DbColumns {
    pub status: String,
    pub deleted: String,
    pub archive_directory: String,
    pub lev0: String,
    pub lev1: String,
    pub lev2: String,
    pub sdata: String,
}

impl DbColumns {
    pub fn for_level(&self, level: Level) -> &str {
        match level {
            Level::Stage | Level::Lev0 => &self.lev0,
            Level::Lev1 => &self.lev1,
            Level::Lev2 => &self.lev2,
        }
    }
}

pub fn split_columns(columns: &str) -> Vec<String> {
    columns
        .split(',')
        .map(str::trim)
        .filter(|column| !column.is_empty())
        .map(str::to_owned)
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct ModeConfig {
    #[serde(rename = "move")]
    pub move_lev0: bool,
    pub lev1: bool,
    pub lev2: bool,
}

#[derive(Debug, Deserialize)]
pub struct InstrumentConfig {
    // koaid prefix (KB) -> instrument name (KCWI)
    pub prefixes: IndexMap<String, String>,
    pub storage_disk: IndexMap<String, String>,
    pub koa_disk: IndexMap<String, String>,
    pub koa_root: String,
    #[serde(default)]
    pub exact_koaid_filter: Vec<String>,
    #[serde(default)]
    pub component_dirs: IndexMap<String, Vec<String>>,
}

impl InstrumentConfig {
    pub fn storage_disk(&self, inst: &str) -> CoreRsResult<&str> {
        lookup(&self.storage_disk, "storage_disk", inst)
    }

    pub fn koa_disk(&self, inst: &str) -> CoreRsResult<&str> {
        lookup(&self.koa_disk, "koa_disk", inst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Mount,
    SshKey,
    Password,
}

#[derive(Debug, Deserialize)]
pub struct SdataConfig {
    #[serde(default)]
    pub remove: IndexMap<String, bool>,
    #[serde(default)]
    pub path_exclude: IndexMap<String, String>,
    pub inst_root: String,
    pub inst_disk: IndexMap<String, String>,
    // instrument -> account stem, e.g. KCWI -> kcwi, matches kcwi1, kcwieng
    pub accounts: IndexMap<String, String>,
    pub servers: IndexMap<String, String>,
    #[serde(default)]
    pub fixed_accounts: IndexMap<String, String>,
    #[serde(default)]
    pub companion_dirs: IndexMap<String, Vec<String>>,
    pub transport: TransportKind,
}

impl SdataConfig {
    pub fn account_stem(&self, inst: &str) -> CoreRsResult<&str> {
        lookup(&self.accounts, "sdata.accounts", inst)
    }

    pub fn server(&self, inst: &str) -> CoreRsResult<&str> {
        lookup(&self.servers, "sdata.servers", inst)
    }

    pub fn inst_disk(&self, inst: &str) -> CoreRsResult<&str> {
        lookup(&self.inst_disk, "sdata.inst_disk", inst)
    }
}

#[derive(Debug, Deserialize)]
pub struct PasswordConfig {
    pub numbered_prefix: String,
    pub numbered_suffix: String,
    pub eng_account: String,
    // appended to every password of the instrument, e.g. after an AD password change
    #[serde(default)]
    pub suffix: IndexMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailConfig {
    pub relay: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub from: String,
    pub admin: String,
    pub warnings: String,
}

fn default_smtp_port() -> u16 {
    25
}

#[derive(Debug, Deserialize)]
pub struct AoConfig {
    pub summit_path: String,
    pub hq_path: String,
    pub user: String,
    pub server: String,
    pub ncopy: u32,
    pub nscrub: u32,
}

#[derive(Debug, Deserialize)]
pub struct KpfGuideConfig {
    pub dir: String,
    pub account: String,
    pub server: String,
    pub transport: TransportKind,
}

#[derive(Debug, Deserialize)]
pub struct TimeframeConfig {
    pub start: u32,
    pub end: u32,
    #[serde(default)]
    pub instruments: IndexMap<String, Timeframe>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Timeframe {
    pub start: u32,
    pub end: u32,
}

impl TimeframeConfig {
    pub fn for_instrument(&self, inst: Option<&str>) -> Timeframe {
        inst.and_then(|inst| self.instruments.get(inst).copied())
            .unwrap_or(Timeframe {
                start: self.start,
                end: self.end,
            })
    }
}

impl AppConfig {
    pub fn profile(&self, dev: bool) -> &Profile {
        if dev { &self.profiles.dev } else { &self.profiles.default }
    }

    // per instrument keys are only required once a run targets that instrument
    pub fn validate_instrument(&self, inst: &str) -> CoreRsResult<()> {
        not_blank("storage_disk", inst, self.instruments.storage_disk(inst)?)?;
        not_blank("koa_disk", inst, self.instruments.koa_disk(inst)?)?;
        if !self.instruments.prefixes.values().any(|name| name == inst) {
            return Err(config_error!(
                section = "instruments.prefixes",
                key = inst,
                message = "no koaid prefix maps to instrument"
            ));
        }
        Ok(())
    }
}

impl Profile {
    pub fn site(&self, tel: &str) -> CoreRsResult<&str> {
        lookup(&self.sites, "profile.sites", tel)
    }
}

impl Validator for AppConfig {
    fn validate(&self) -> CoreRsResult<()> {
        for (name, profile) in [("default", &self.profiles.default), ("dev", &self.profiles.dev)] {
            if profile.sites.is_empty() {
                return Err(config_error!(section = name, key = "sites", message = "no archive api site"));
            }
            for (tel, site) in &profile.sites {
                not_blank(name, tel, site)?;
            }
            not_blank(name, "user", &profile.user)?;
            not_blank(name, "store_server", &profile.store_server)?;
            not_blank(name, "storage_root", &profile.storage_root)?;
            not_blank(name, "files_root", &profile.files_root)?;
            not_blank(name, "log_dir", &profile.log_dir)?;
        }
        not_blank("archive", "archived", &self.archive.archived)?;
        not_blank("db_columns", "status", &self.db_columns.status)?;
        not_blank("db_columns", "deleted", &self.db_columns.deleted)?;
        not_blank("db_columns", "archive_directory", &self.db_columns.archive_directory)?;
        not_blank("db_columns", "lev0", &self.db_columns.lev0)?;
        not_blank("db_columns", "lev1", &self.db_columns.lev1)?;
        not_blank("db_columns", "lev2", &self.db_columns.lev2)?;
        not_blank("db_columns", "sdata", &self.db_columns.sdata)?;
        not_blank("instruments", "koa_root", &self.instruments.koa_root)?;
        not_blank("email", "relay", &self.email.relay)?;
        not_blank("email", "from", &self.email.from)?;
        not_blank("email", "admin", &self.email.admin)?;
        not_blank("email", "warnings", &self.email.warnings)?;
        Ok(())
    }
}

fn lookup<'a>(map: &'a IndexMap<String, String>, section: &str, key: &str) -> CoreRsResult<&'a str> {
    map.get(key)
        .map(String::as_str)
        .ok_or_else(|| config_error!(section = section, key = key, message = "there is no parameter"))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::path::PathBuf;

    use framework::exception::error_code;
    use framework::json;
    use framework::validate::Validator as _;

    use super::AppConfig;
    use super::TransportKind;
    use crate::record::Level;

    pub(crate) fn config() -> AppConfig {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/conf.json");
        json::load_file(&path).unwrap()
    }

    #[test]
    fn load_bundled_config() {
        let config = config();
        config.validate().unwrap();
        assert_eq!(config.archive.archived, "COMPLETE");
        assert_eq!(config.sdata.transport, TransportKind::Password);
        assert_eq!(config.kpf_guide.transport, TransportKind::Password);
        assert_eq!(config.db_columns.for_level(Level::Stage), config.db_columns.lev0);
        assert_eq!(config.profile(true).log_dir, "log");
    }

    #[test]
    fn validate_instrument() {
        let config = config();
        config.validate_instrument("KCWI").unwrap();
        let error = config.validate_instrument("UNKNOWN").unwrap_err();
        assert!(error.has_code(error_code::CONFIG_ERROR));
        assert!(error.message.contains("section=storage_disk"), "{}", error.message);
    }

    #[test]
    fn split_columns() {
        assert_eq!(
            super::split_columns("koaid, status ,ofname,,process_dir"),
            vec!["koaid", "status", "ofname", "process_dir"]
        );
    }

    #[test]
    fn timeframe() {
        let config = config();
        let timeframe = config.timeframe.for_instrument(Some("KPF"));
        assert_eq!((timeframe.start, timeframe.end), (7, 3));
        let timeframe = config.timeframe.for_instrument(Some("KCWI"));
        assert_eq!((timeframe.start, timeframe.end), (21, 14));
        let timeframe = config.timeframe.for_instrument(None);
        assert_eq!((timeframe.start, timeframe.end), (21, 14));
    }
}
