#[macro_use]
pub mod exception;
pub mod asset;
pub mod fs;
pub mod http;
pub mod json;
pub mod log;
pub mod shell;
pub mod validate;
