use std::fs::File;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Local;
use tracing::Instrument;
use tracing::Level;
use tracing::info_span;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use uuid::Uuid;

pub use layer::WarningBuffer;
use layer::WarningLayer;

use crate::exception::CoreRsResult;
use crate::exception::Exception;
use crate::exception::Severity;

mod layer;

pub struct LogConfig<'a> {
    pub name: &'a str,
    pub log_dir: Option<&'a Path>,
}

pub struct LogHandle {
    pub warnings: WarningBuffer,
    pub log_file: Option<PathBuf>,
}

// console gets INFO, the log file gets everything down to DEBUG, WARN and above are buffered for the warnings email
pub fn init(config: LogConfig) -> CoreRsResult<LogHandle> {
    let warnings = WarningBuffer::default();

    let (file_layer, log_file) = match config.log_dir {
        Some(log_dir) => {
            let path = log_file_path(log_dir, config.name);
            let file = File::create(&path)
                .map_err(|err| exception!(message = format!("failed to create log file, path={}", path.display()), source = err))?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_line_number(true)
                .with_writer(Mutex::new(file))
                .with_filter(LevelFilter::DEBUG);
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_ansi(false)
                .with_line_number(true)
                .with_filter(LevelFilter::INFO),
        )
        .with(file_layer)
        .with(WarningLayer {
            buffer: warnings.clone(),
        })
        .try_init()
        .map_err(|err| exception!(message = "failed to init tracing subscriber", source = err))?;

    Ok(LogHandle { warnings, log_file })
}

fn log_file_path(log_dir: &Path, name: &str) -> PathBuf {
    let now = Local::now().format("%Y%m%d_%H:%M:%S");
    log_dir.join(format!("{name}_{now}.log"))
}

macro_rules! log_event {
    (level = $level:ident, error_code = $error_code:expr, $($arg:tt)+) => {
        match $level {
            ::tracing::Level::WARN => {
                match $error_code {
                    Some(ref error_code) => ::tracing::warn!(error_code, $($arg)+),
                    None => ::tracing::warn!($($arg)+),
                }
            },
            _ => {
                match $error_code {
                    Some(ref error_code) => ::tracing::error!(error_code, $($arg)+),
                    None => ::tracing::error!($($arg)+),
                }
            }
        }
    };
}

pub async fn start_action<T>(action: &str, task: T) -> bool
where
    T: Future<Output = CoreRsResult<()>>,
{
    let action_id = Uuid::now_v7().to_string();
    let action_span = info_span!("action", action, action_id);
    async {
        let result = task.await;
        if let Err(ref e) = result {
            log_exception(e);
        }
        result.is_ok()
    }
    .instrument(action_span)
    .await
}

pub fn log_exception(e: &Exception) {
    let level = match e.severity {
        Severity::Warn => Level::WARN,
        Severity::Error => Level::ERROR,
    };
    let message = &e.message;
    log_event!(
        level = level,
        error_code = e.code,
        backtrace = e.to_string(),
        "{message}"
    );
}
