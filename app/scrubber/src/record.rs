use std::fmt::Display;
use std::fmt::Formatter;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// One row of an archive API search, keyed by column name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileRecord {
    columns: Map<String, Value>,
}

impl FileRecord {
    // null, "", 0, false, [] and {} all count as empty, same as the archive db treats them
    pub fn text(&self, column: &str) -> Option<String> {
        match self.columns.get(column)? {
            Value::String(value) if !value.is_empty() => Some(value.clone()),
            Value::Number(value) if value.as_f64().is_some_and(|value| value != 0.0) => Some(value.to_string()),
            Value::Bool(true) => Some("1".to_owned()),
            value @ Value::Array(values) if !values.is_empty() => Some(value.to_string()),
            value @ Value::Object(columns) if !columns.is_empty() => Some(value.to_string()),
            Value::String(_) | Value::Number(_) | Value::Bool(false) | Value::Array(_) | Value::Object(_) | Value::Null => {
                None
            }
        }
    }

    pub fn str(&self, column: &str) -> Option<&str> {
        self.columns
            .get(column)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn koaid(&self) -> Option<&str> {
        self.str("koaid")
    }

    pub fn ofname(&self) -> Option<&str> {
        self.str("ofname")
    }

    pub fn stage_file(&self) -> Option<&str> {
        self.str("stage_file")
    }

    pub fn process_dir(&self) -> Option<&str> {
        self.str("process_dir")
    }

    // once archive_dir is set the files live on long term storage and must not be moved again
    pub fn is_migrated(&self, archive_dir_column: &str) -> bool {
        self.text(archive_dir_column).is_some()
    }
}

impl From<Map<String, Value>> for FileRecord {
    fn from(columns: Map<String, Value>) -> Self {
        FileRecord { columns }
    }
}

/// `<instrument-prefix>.<utdate>.<seq>.<subseq>`, e.g. KB.20210116.57436.94
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Koaid<'a> {
    pub prefix: &'a str,
    pub utdate: &'a str,
    pub sequence: &'a str,
    pub subsequence: &'a str,
}

impl<'a> Koaid<'a> {
    pub fn parse(koaid: &'a str) -> Option<Self> {
        let mut parts = koaid.split('.');
        let koaid = Koaid {
            prefix: parts.next()?,
            utdate: parts.next()?,
            sequence: parts.next()?,
            subsequence: parts.next()?,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(koaid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    Stage,
    Lev0,
    Lev1,
    Lev2,
}

impl Level {
    pub fn number(self) -> u8 {
        match self {
            Level::Stage | Level::Lev0 => 0,
            Level::Lev1 => 1,
            Level::Lev2 => 2,
        }
    }

    pub fn dir_name(self) -> String {
        format!("lev{}", self.number())
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Stage => write!(f, "stage"),
            Level::Lev0 => write!(f, "lev0"),
            Level::Lev1 => write!(f, "lev1"),
            Level::Lev2 => write!(f, "lev2"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::FileRecord;
    use super::Koaid;
    use super::Level;

    fn record() -> FileRecord {
        serde_json::from_value(json!({
            "koaid": "KB.20210116.57436.94",
            "status": "COMPLETE",
            "status_code": 0,
            "ofname": "",
            "level": 2,
            "archive_dir": null,
            "source_deleted": false,
            "files": [],
            "header": {},
            "extensions": ["fits"],
            "keywords": {"INSTRUME": "KCWI"}
        }))
        .unwrap()
    }

    #[test]
    fn text() {
        let record = record();
        assert_eq!(record.text("koaid").as_deref(), Some("KB.20210116.57436.94"));
        assert_eq!(record.text("level").as_deref(), Some("2"));
        assert_eq!(record.text("ofname"), None);
        assert_eq!(record.text("status_code"), None);
        assert_eq!(record.text("archive_dir"), None);
        assert_eq!(record.text("source_deleted"), None);
        assert_eq!(record.text("missing"), None);
        assert_eq!(record.text("files"), None);
        assert_eq!(record.text("header"), None);
        assert_eq!(record.text("extensions").as_deref(), Some(r#"["fits"]"#));
        assert_eq!(record.text("keywords").as_deref(), Some(r#"{"INSTRUME":"KCWI"}"#));
        assert!(!record.is_migrated("archive_dir"));
    }

    #[test]
    fn parse_koaid() {
        let koaid = Koaid::parse("KB.20210116.57436.94").unwrap();
        assert_eq!(koaid.prefix, "KB");
        assert_eq!(koaid.utdate, "20210116");
        assert_eq!(koaid.sequence, "57436");
        assert_eq!(koaid.subsequence, "94");

        assert_eq!(Koaid::parse("KB.20210116.57436"), None);
        assert_eq!(Koaid::parse("KB.20210116.57436.94.fits"), None);
        assert_eq!(Koaid::parse(""), None);
    }

    #[test]
    fn level() {
        assert_eq!(Level::Stage.number(), 0);
        assert_eq!(Level::Lev2.dir_name(), "lev2");
        assert_eq!(Level::Lev1.to_string(), "lev1");
    }
}
