// bad or missing conf.json entry, the run stops before any record is touched
pub const CONFIG_ERROR: &str = "CONFIG_ERROR";
// a record or argument failed a check, only that record is skipped
pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
// archive api unreachable, non-json body or success != 1
pub const API_ERROR: &str = "API_ERROR";
// rsync or storage directory creation
pub const TRANSFER_ERROR: &str = "TRANSFER_ERROR";
// ssh/sshpass session against an instrument or storage host
pub const REMOTE_ERROR: &str = "REMOTE_ERROR";
