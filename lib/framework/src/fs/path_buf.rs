use std::path::PathBuf;

use crate::exception::CoreRsResult;

pub trait PathBufExt {
    fn into_absolute_path(self) -> CoreRsResult<PathBuf>;
}

impl PathBufExt for PathBuf {
    fn into_absolute_path(self) -> CoreRsResult<PathBuf> {
        if self.is_absolute() {
            return Ok(self);
        }
        let current_dir = std::env::current_dir()
            .map_err(|err| exception!(message = "failed to get current directory", source = err))?;
        Ok(current_dir.join(self))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::PathBufExt;

    #[test]
    fn into_absolute_path() {
        let path = PathBuf::from("log").into_absolute_path().unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("log"));

        let path = PathBuf::from("/var/log/scrubber").into_absolute_path().unwrap();
        assert_eq!(path, PathBuf::from("/var/log/scrubber"));
    }
}
