use std::collections::HashSet;
use std::fs::DirBuilder;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use framework::exception;
use framework::exception::CoreRsResult;
use framework::exception::error_code;
use tracing::debug;

/// Destination directories already created during this run.
#[derive(Default)]
pub struct DirectoryCache {
    made: HashSet<PathBuf>,
}

impl DirectoryCache {
    // creates the missing components of `dir` from `root` downward, root itself must exist
    pub fn ensure(&mut self, root: &Path, dir: &Path) -> CoreRsResult<()> {
        if self.made.contains(dir) {
            return Ok(());
        }
        let relative = dir.strip_prefix(root).map_err(|err| {
            exception!(
                code = error_code::TRANSFER_ERROR,
                message = format!("directory is outside of root, dir={}, root={}", dir.display(), root.display()),
                source = err
            )
        })?;
        if !root.is_dir() {
            return Err(exception!(
                code = error_code::TRANSFER_ERROR,
                message = format!("root directory does not exist, root={}", root.display())
            ));
        }

        let mut current = root.to_path_buf();
        for component in relative.components() {
            current.push(component);
            if current.is_dir() {
                continue;
            }
            match DirBuilder::new().create(&current) {
                Ok(()) => debug!(dir = %current.display(), "created directory"),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
                Err(err) => {
                    return Err(exception!(
                        code = error_code::TRANSFER_ERROR,
                        message = format!("failed to create directory, dir={}", current.display()),
                        source = err
                    ));
                }
            }
        }
        self.made.insert(dir.to_path_buf());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use framework::exception::error_code;

    use super::DirectoryCache;

    #[test]
    fn ensure() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("net/storageserver");
        fs::create_dir_all(root.join("koastorage04/KCWI")).unwrap();
        let target = root.join("koastorage04/KCWI/koadata39/20210116/lev0");

        let mut cache = DirectoryCache::default();
        cache.ensure(&root, &target).unwrap();
        assert!(target.is_dir());

        // cached, no filesystem access
        fs::remove_dir(&target).unwrap();
        cache.ensure(&root, &target).unwrap();
        assert!(!target.exists());

        DirectoryCache::default().ensure(&root, &target).unwrap();
        assert!(target.is_dir());
    }

    #[test]
    fn missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("net/storageserver");

        let error = DirectoryCache::default()
            .ensure(&root, &root.join("koastorage04/KCWI"))
            .unwrap_err();
        assert!(error.has_code(error_code::TRANSFER_ERROR));
        assert!(!root.exists());

        let error = DirectoryCache::default()
            .ensure(&root, &dir.path().join("elsewhere"))
            .unwrap_err();
        assert!(error.has_code(error_code::TRANSFER_ERROR));
    }
}
