use std::fs::read_to_string;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::exception::CoreRsResult;
use crate::exception::error_code;

pub fn load_file<T>(path: &Path) -> CoreRsResult<T>
where
    T: DeserializeOwned,
{
    let json = read_to_string(path).map_err(|err| {
        exception!(
            code = error_code::CONFIG_ERROR,
            message = format!("failed to read file, path={}", path.to_string_lossy()),
            source = err
        )
    })?;
    serde_json::from_str(&json).map_err(|err| {
        exception!(
            code = error_code::CONFIG_ERROR,
            message = format!("failed to deserialize, path={}", path.to_string_lossy()),
            source = err
        )
    })
}
