use std::fmt::Display;
use std::fmt::Formatter;
use std::path::Path;

use indexmap::IndexMap;
use tracing::debug;
use tracing::warn;

use crate::record::FileRecord;

pub const DEFAULT_EXEMPT_COLUMNS: [&str; 3] = ["status_code", "archive_dir", "level"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerifyError {
    Incomplete,
    InvalidStatus,
    InvalidArchiveDir,
    StageFileNotFound,
    // set by the caller, the validator never checks storage
    NotStored,
}

impl Display for VerifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyError::Incomplete => write!(f, "INCOMPLETE RESULTS"),
            VerifyError::InvalidStatus => write!(f, "INVALID STATUS"),
            VerifyError::InvalidArchiveDir => write!(f, "INVALID ARCHIVE DIR"),
            VerifyError::StageFileNotFound => write!(f, "STAGE FILE NOT FOUND"),
            VerifyError::NotStored => write!(f, "DATA NOT ON STORAGE"),
        }
    }
}

/// Failure message -> koaids that failed with it, distinct and in first seen order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ErrorHistogram {
    errors: IndexMap<VerifyError, Vec<String>>,
}

impl ErrorHistogram {
    pub fn record(&mut self, error: VerifyError, koaid: &str) {
        let koaids = self.errors.entry(error).or_default();
        if !koaids.iter().any(|existing| existing == koaid) {
            koaids.push(koaid.to_owned());
        }
    }

    pub fn merge(&mut self, other: ErrorHistogram) {
        for (error, koaids) in other.errors {
            for koaid in koaids {
                self.record(error, &koaid);
            }
        }
    }

    pub fn get(&self, error: VerifyError) -> Option<&[String]> {
        self.errors.get(&error).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl Display for ErrorHistogram {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (error, koaids) in &self.errors {
            writeln!(f, "{error} ({}):", koaids.len())?;
            for koaid in koaids {
                writeln!(f, "    {koaid}")?;
            }
        }
        Ok(())
    }
}

pub enum StagedCopyPolicy {
    Disabled,
    // stage_file paths are relative to this root, e.g. /k1 for /k1koadata/stage/...
    Required { root: String },
}

pub struct RecordValidator<'a> {
    archived: &'a str,
    status_column: &'a str,
    exempt_columns: Vec<&'a str>,
    staged_copy: StagedCopyPolicy,
}

impl<'a> RecordValidator<'a> {
    pub fn new(archived: &'a str, status_column: &'a str) -> Self {
        RecordValidator {
            archived,
            status_column,
            exempt_columns: DEFAULT_EXEMPT_COLUMNS.to_vec(),
            staged_copy: StagedCopyPolicy::Disabled,
        }
    }

    #[must_use]
    pub fn exempt(mut self, column: &'a str) -> Self {
        self.exempt_columns.push(column);
        self
    }

    #[must_use]
    pub fn staged_copy(mut self, policy: StagedCopyPolicy) -> Self {
        self.staged_copy = policy;
        self
    }

    /// Stable filter, passing records keep their original order.
    pub fn verify(&self, records: Vec<FileRecord>, required_columns: &[String]) -> (Vec<FileRecord>, ErrorHistogram) {
        let mut errors = ErrorHistogram::default();
        let mut valid = Vec::with_capacity(records.len());
        for record in records {
            match self.verify_record(&record, required_columns) {
                Ok(()) => valid.push(record),
                Err(error) => {
                    let koaid = record.koaid().unwrap_or_default();
                    warn!(koaid, "ERROR: {error}, record={}", serde_json::to_string(&record).unwrap_or_default());
                    errors.record(error, koaid);
                }
            }
        }
        debug!(valid = valid.len(), "verified records");
        (valid, errors)
    }

    fn verify_record(&self, record: &FileRecord, required_columns: &[String]) -> Result<(), VerifyError> {
        for column in required_columns {
            let column = column.as_str();
            let value = record.text(column);
            match value {
                None if !self.exempt_columns.contains(&column) => return Err(VerifyError::Incomplete),
                Some(ref status) if column == self.status_column && status != self.archived => {
                    return Err(VerifyError::InvalidStatus);
                }
                Some(ref process_dir) if column == "process_dir" && !last_segment(process_dir).contains("lev") => {
                    return Err(VerifyError::InvalidArchiveDir);
                }
                None | Some(_) => {}
            }
        }

        if let StagedCopyPolicy::Required { ref root } = self.staged_copy
            && required_columns.iter().any(|column| column == "stage_file")
            && let Some(stage_file) = record.stage_file()
            && !staged_copy_exists(root, stage_file)
        {
            return Err(VerifyError::StageFileNotFound);
        }

        Ok(())
    }
}

fn last_segment(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or_default()
}

fn staged_copy_exists(root: &str, stage_file: &str) -> bool {
    let path = format!("{root}{}", stage_file.trim_start_matches('/'));
    Path::new(&path).exists() || Path::new(&format!("{path}.gz")).exists()
}
