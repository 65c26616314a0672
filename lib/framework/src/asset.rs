use std::env::current_exe;
use std::path::Path;
use std::path::PathBuf;

use crate::exception::CoreRsResult;
use crate::exception::error_code;

// explicit path wins, otherwise look next to the binary, then in the crate source folder for debug builds
pub fn asset_path(explicit: Option<&Path>, default: &str) -> CoreRsResult<PathBuf> {
    if let Some(path) = explicit {
        return if path.exists() {
            Ok(path.to_path_buf())
        } else {
            Err(exception!(
                code = error_code::CONFIG_ERROR,
                message = format!("file not found, path={}", path.to_string_lossy())
            ))
        };
    }

    let exe_path = current_exe()?;
    let asset_path = find_asset_path(&exe_path, default);
    if asset_path.exists() {
        Ok(asset_path)
    } else {
        Err(exception!(
            code = error_code::CONFIG_ERROR,
            message = format!(
                "asset not found, asset={}, exe={}",
                asset_path.to_string_lossy(),
                exe_path.to_string_lossy()
            )
        ))
    }
}

#[cfg(debug_assertions)]
fn find_asset_path(exe_path: &Path, path: &str) -> PathBuf {
    let asset_path = exe_path.with_file_name(path);
    if asset_path.exists() {
        return asset_path;
    }
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_default();
    let source_path = PathBuf::from(manifest_dir).join(path);
    if source_path.exists() {
        tracing::debug!("load asset from source code folder, asset={}", source_path.to_string_lossy());
        return source_path;
    }
    asset_path
}

#[cfg(not(debug_assertions))]
fn find_asset_path(exe_path: &Path, path: &str) -> PathBuf {
    exe_path.with_file_name(path)
}
