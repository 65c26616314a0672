use std::error::Error;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;

use serde::Deserialize;
use serde::Serialize;

pub mod error_code;

pub type CoreRsResult<T> = Result<T, Exception>;

/// Error of a scrubber run, chained through `source` down to the io or http cause.
///
/// `log::log_exception` writes it at the level of `severity`, so a `Warn` exception
/// lands in the warnings email while the run carries on with the next record.
pub struct Exception {
    pub severity: Severity,
    pub code: Option<String>,
    pub message: String,
    pub location: Option<String>,
    pub source: Option<Box<Exception>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "WARN")]
    Warn,
    #[serde(rename = "ERROR")]
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warn => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

impl Exception {
    /// Compares against the constants in [`error_code`], e.g. `REMOTE_ERROR` for a failed ssh delete.
    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }
}

impl Debug for Exception {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for Exception {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut index = 0;
        let mut current_source = Some(self);
        while let Some(source) = current_source {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{index}: {} ", source.severity)?;
            if let Some(ref code) = source.code {
                write!(f, "[{code}] ")?;
            }
            write!(f, "{}", source.message)?;
            if let Some(ref location) = source.location {
                write!(f, " at {location}")?;
            }
            index += 1;
            current_source = source.source.as_deref();
        }
        Ok(())
    }
}

#[macro_export]
macro_rules! exception {
    ($(severity = $severity:expr,)? $(code = $code:expr,)? message = $message:expr $(,source = $source:expr)?) => {{
        #[allow(unused_variables)]
        let severity = $crate::exception::Severity::Error;
        $(
            let severity = $severity;
        )?
        #[allow(unused_variables)]
        let code: Option<String> = None;
        $(
            let code = Some($code.to_string());
        )?
        #[allow(unused_variables)]
        let source: Option<Box<$crate::exception::Exception>> = None;
        $(
            let source = Some(Box::new($source.into()));
        )?
        $crate::exception::Exception {
            severity,
            code,
            message: $message.to_string(),
            location: Some(format!("{}:{}:{}", file!(), line!(), column!())),
            source,
        }
    }};
}

// WARN by default, a record that fails a check is reported but does not abort the run
#[macro_export]
macro_rules! validation_error {
    ($(severity = $severity:expr,)? message = $message:expr) => {{
        #[allow(unused_variables)]
        let severity = $crate::exception::Severity::Warn;
        $(
            let severity = $severity;
        )?
        $crate::exception!(severity = severity, code = $crate::exception::error_code::VALIDATION_ERROR, message = $message)
    }};
}

// names the conf.json section and key to fix
#[macro_export]
macro_rules! config_error {
    (section = $section:expr, key = $key:expr, message = $message:expr) => {{
        $crate::exception!(
            code = $crate::exception::error_code::CONFIG_ERROR,
            message = format!("check config file, {}, section={}, key={}", $message, $section, $key)
        )
    }};
}

fn source(source: Option<&(dyn Error + 'static)>) -> Option<Box<Exception>> {
    let mut sources = Vec::new();
    let mut current_source = source;
    while let Some(target) = current_source {
        sources.push(target);
        current_source = target.source();
    }

    let mut result = None;
    for error in sources.into_iter().rev() {
        result = Some(Box::new(Exception {
            severity: Severity::Error,
            code: None,
            message: error.to_string(),
            location: None,
            source: result,
        }));
    }
    result
}

impl<T> From<T> for Exception
where
    T: Error + 'static,
{
    fn from(error: T) -> Self {
        Exception {
            severity: Severity::Error,
            code: None,
            message: error.to_string(),
            location: None,
            source: source(error.source()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::Exception;
    use super::Severity;
    use super::error_code;

    #[test]
    fn display_chain() {
        let error = exception!(
            code = error_code::TRANSFER_ERROR,
            message = "rsync failed, source=/k1koadata/KCWI/20210116/lev0",
            source = io::Error::other("disk full")
        );
        let text = error.to_string();
        assert!(
            text.starts_with("0: ERROR [TRANSFER_ERROR] rsync failed, source=/k1koadata/KCWI/20210116/lev0 at "),
            "{text}"
        );
        assert!(text.ends_with("1: ERROR disk full"), "{text}");
        assert!(error.has_code(error_code::TRANSFER_ERROR));
        assert!(!error.has_code(error_code::REMOTE_ERROR));
    }

    #[test]
    fn chain_from_remote_failure() {
        let cause = exception!(code = error_code::TRANSFER_ERROR, message = "command failed, status=255, stderr=");
        let error = exception!(
            code = error_code::REMOTE_ERROR,
            message = "remote command failed, command=ssh kcwi1@kcwiserver /bin/rm /sdata1400/kb.fits",
            source = cause
        );
        assert!(error.has_code(error_code::REMOTE_ERROR));
        let source = error.source.as_deref();
        assert!(source.is_some_and(|source| source.has_code(error_code::TRANSFER_ERROR)));
        assert!(error.to_string().contains("1: ERROR [TRANSFER_ERROR] command failed, status=255"));
    }

    #[test]
    fn config_error() {
        let error: Exception = config_error!(section = "storage_disk", key = "KCWI", message = "missing value");
        assert_eq!(error.severity, Severity::Error);
        assert!(error.has_code(error_code::CONFIG_ERROR));
        assert_eq!(
            error.message,
            "check config file, missing value, section=storage_disk, key=KCWI"
        );
    }

    #[test]
    fn validation_error_is_warn() {
        let error = validation_error!(message = "some field is wrong");
        assert_eq!(error.severity, Severity::Warn);
        assert!(error.has_code(error_code::VALIDATION_ERROR));
    }
}
