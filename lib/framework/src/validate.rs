use crate::exception::CoreRsResult;

pub trait Validator {
    fn validate(&self) -> CoreRsResult<()>;
}

pub fn not_blank(section: &str, key: &str, value: &str) -> CoreRsResult<()> {
    if value.trim().is_empty() {
        return Err(config_error!(section = section, key = key, message = "value must not be blank"));
    }
    Ok(())
}
