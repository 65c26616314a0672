use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Write as _;

use chrono::NaiveDate;
use indexmap::IndexMap;

use crate::record::Level;
use crate::transfer::TransferOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Stage,
    Lev0,
    Lev1,
    Lev2,
    Sdata,
}

impl From<Level> for Category {
    fn from(level: Level) -> Self {
        match level {
            Level::Stage => Category::Stage,
            Level::Lev0 => Category::Lev0,
            Level::Lev1 => Category::Lev1,
            Level::Lev2 => Category::Lev2,
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Stage => write!(f, "stage files"),
            Category::Lev0 => write!(f, "lev0 KOAIDs"),
            Category::Lev1 => write!(f, "lev1 KOAIDs"),
            Category::Lev2 => write!(f, "lev2 KOAIDs"),
            Category::Sdata => write!(f, "sdata files"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    pub found: u64,
    pub succeeded: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FileCount {
    pub before: Option<u64>,
    pub after: Option<u64>,
}

impl FileCount {
    // files that left the tree, e.g. moved off the source disk
    pub fn removed(&self) -> Option<i64> {
        Some(to_i64(self.before?) - to_i64(self.after?))
    }

    pub fn added(&self) -> Option<i64> {
        self.removed().map(|removed| -removed)
    }
}

/// Per run tallies. A skipped missing file counts as neither found nor succeeded,
/// so `found >= succeeded` holds for every category.
#[derive(Debug, Default)]
pub struct Metrics {
    // rows returned by the archive api, rows passing validation
    candidates: IndexMap<Category, (usize, usize)>,
    counters: IndexMap<Category, Counter>,
    pub source: FileCount,
    pub storage: FileCount,
    pub undeleted_files: usize,
}

impl Metrics {
    pub fn candidates(&mut self, category: Category, returned: usize, valid: usize) {
        self.candidates.insert(category, (returned, valid));
    }

    pub fn record(&mut self, category: Category, outcome: TransferOutcome) {
        let counter = self.counters.entry(category).or_default();
        match outcome {
            TransferOutcome::Moved => {
                counter.found += 1;
                counter.succeeded += 1;
            }
            TransferOutcome::Failed => counter.found += 1,
            TransferOutcome::SkippedMissing => {}
        }
    }

    pub fn counter(&self, category: Category) -> Counter {
        self.counters.get(&category).copied().unwrap_or_default()
    }

    pub fn total_moved(&self) -> u64 {
        self.counters.values().map(|counter| counter.succeeded).sum()
    }

    /// True when the files that left the source equal the files that arrived on storage.
    pub fn reconciled(&self) -> bool {
        self.source.removed() == self.storage.added()
    }

    pub fn report(&self, title: &str, utd: NaiveDate, utd2: NaiveDate) -> String {
        let mut report = String::new();
        let _ = writeln!(report, "{title}");
        let _ = writeln!(report, "UT date range: {utd} to {utd2}");

        if !self.candidates.is_empty() {
            let _ = writeln!(report, "\nArchive query results (returned / valid):");
            for (category, (returned, valid)) in &self.candidates {
                let _ = writeln!(report, "  {category:<12} {returned:>6} / {valid}");
            }
        }

        let _ = writeln!(report, "\nTransfers (found / succeeded):");
        for (category, counter) in &self.counters {
            let _ = writeln!(report, "  {category:<12} {:>6} / {}", counter.found, counter.succeeded);
        }
        let _ = writeln!(report, "  {:<12} {:>6}", "total moved", self.total_moved());

        write_count(&mut report, "source", self.source);
        write_count(&mut report, "storage", self.storage);
        if let (Some(removed), Some(added)) = (self.source.removed(), self.storage.added())
            && self.storage.before.is_some()
        {
            let _ = writeln!(
                report,
                "\nTotal files moved from source: {removed}, total storage delta: {added}"
            );
        }
        let _ = writeln!(
            report,
            "\nTotal number of files not previously deleted (any status): {}",
            self.undeleted_files
        );
        report
    }
}

fn write_count(report: &mut String, name: &str, count: FileCount) {
    if count.before.is_none() && count.after.is_none() {
        return;
    }
    let before = count.before.map_or_else(|| "n/a".to_owned(), |before| before.to_string());
    let after = count.after.map_or_else(|| "n/a".to_owned(), |after| after.to_string());
    let _ = writeln!(report, "Number of {name} files before: {before}, after: {after}");
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::Category;
    use super::Counter;
    use super::FileCount;
    use super::Metrics;
    use crate::transfer::TransferOutcome;

    #[test]
    fn found_never_below_succeeded() {
        let mut metrics = Metrics::default();
        for outcome in [
            TransferOutcome::Moved,
            TransferOutcome::SkippedMissing,
            TransferOutcome::Failed,
            TransferOutcome::Moved,
        ] {
            metrics.record(Category::Lev0, outcome);
        }

        assert_eq!(metrics.counter(Category::Lev0), Counter { found: 3, succeeded: 2 });
        assert_eq!(metrics.counter(Category::Lev1), Counter::default());
        assert_eq!(metrics.total_moved(), 2);
    }

    #[test]
    fn reconciled() {
        let mut metrics = Metrics {
            source: FileCount {
                before: Some(120),
                after: Some(100),
            },
            storage: FileCount {
                before: Some(5000),
                after: Some(5020),
            },
            ..Metrics::default()
        };
        assert!(metrics.reconciled());

        metrics.storage.after = Some(5019);
        assert!(!metrics.reconciled());

        metrics.storage.after = None;
        assert!(!metrics.reconciled());
    }

    #[test]
    fn report() {
        let mut metrics = Metrics::default();
        metrics.candidates(Category::Lev0, 3, 2);
        metrics.record(Category::Lev0, TransferOutcome::Moved);
        metrics.record(Category::Stage, TransferOutcome::Failed);
        metrics.source = FileCount {
            before: Some(10),
            after: Some(9),
        };
        metrics.undeleted_files = 42;
        let utd = NaiveDate::from_ymd_opt(2021, 1, 16).unwrap();
        let utd2 = NaiveDate::from_ymd_opt(2021, 1, 17).unwrap();

        let report = metrics.report("RTI Scrubber Report: KCWI", utd, utd2);

        assert!(report.starts_with("RTI Scrubber Report: KCWI\nUT date range: 2021-01-16 to 2021-01-17\n"));
        assert!(report.contains("  lev0 KOAIDs       3 / 2\n"), "{report}");
        assert!(report.contains("  lev0 KOAIDs       1 / 1\n"), "{report}");
        assert!(report.contains("  stage files       1 / 0\n"), "{report}");
        assert!(report.contains("Number of source files before: 10, after: 9\n"));
        assert!(!report.contains("storage files"));
        assert!(!report.contains("total storage delta"));
        assert!(report.ends_with("(any status): 42\n"));
    }
}
