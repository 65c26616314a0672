use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;
use tracing::warn;
use walkdir::WalkDir;

/// Counts regular files below `root`, descending into sub directories. A missing root counts as zero.
pub fn count_files(root: &Path) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .count() as u64
}

/// Removes empty directories below `root`, deepest first. `root` itself is kept.
pub fn prune_empty_dirs(root: &Path) -> usize {
    let mut removed = 0;
    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let Ok(entry) = entry else {
            continue;
        };
        if entry.file_type().is_dir() && remove_dir_if_empty(entry.path()) {
            removed += 1;
        }
    }
    removed
}

pub fn remove_dir_if_empty(path: &Path) -> bool {
    match fs::read_dir(path) {
        Ok(mut entries) => {
            if entries.next().is_some() {
                return false;
            }
        }
        Err(_) => return false,
    }
    match fs::remove_dir(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed empty directory");
            true
        }
        Err(err) if err.kind() == ErrorKind::NotFound => false,
        Err(err) => {
            warn!(path = %path.display(), "failed to remove empty directory, error={err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    #[test]
    fn count_files() {
        let dir = tempfile::tempdir().unwrap();
        let lev0 = dir.path().join("KCWI/20210116/lev0");
        fs::create_dir_all(&lev0).unwrap();
        fs::write(lev0.join("KB.20210116.57436.94.fits"), b"data").unwrap();
        fs::write(lev0.join("KB.20210116.57436.94.jpg"), b"data").unwrap();
        fs::write(dir.path().join("dep_KCWI_20210116.log"), b"log").unwrap();

        assert_eq!(super::count_files(dir.path()), 3);
        assert_eq!(super::count_files(&dir.path().join("missing")), 0);
    }

    #[test]
    fn prune_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("20210116");
        fs::create_dir_all(root.join("lev0/thumbs")).unwrap();
        fs::create_dir_all(root.join("lev1")).unwrap();
        fs::create_dir_all(root.join("lev2")).unwrap();
        fs::write(root.join("lev2/KB.20210116.57436.94_icube.fits"), b"data").unwrap();

        let removed = super::prune_empty_dirs(&root);

        assert_eq!(removed, 3);
        assert!(root.exists());
        assert!(!root.join("lev0").exists());
        assert!(!root.join("lev1").exists());
        assert!(root.join("lev2").exists());
    }

    #[test]
    fn remove_dir_if_empty() {
        let dir = tempfile::tempdir().unwrap();
        let month = dir.path().join("21/02");
        fs::create_dir_all(month.join("26")).unwrap();

        assert!(!super::remove_dir_if_empty(&month));
        assert!(super::remove_dir_if_empty(&month.join("26")));
        assert!(super::remove_dir_if_empty(&month));
        assert!(!super::remove_dir_if_empty(&month));
    }
}
