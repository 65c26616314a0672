use std::fmt::Debug;
use std::fmt::Formatter;

use framework::exception;
use framework::exception::CoreRsResult;
use framework::exception::error_code;

use crate::config::PasswordConfig;

/// Shared secret of a remote account. Has no Display, Debug is redacted.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for Password {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Password(***)")
    }
}

/// Derives the instrument account owning a remote path and that account's password.
///
/// Accounts are named `{stem}{n}` (kcwi1, kcwi2) or contain `eng` (kcwieng, moseng).
/// Numbered accounts share a password pattern, engineering accounts one common password.
pub struct CredentialResolver<'a> {
    stem: String,
    fixed_account: Option<&'a str>,
    passwords: &'a PasswordConfig,
    suffix: &'a str,
}

impl<'a> CredentialResolver<'a> {
    pub fn new(stem: &str, fixed_account: Option<&'a str>, passwords: &'a PasswordConfig, suffix: Option<&'a str>) -> Self {
        CredentialResolver {
            stem: stem.to_lowercase(),
            fixed_account,
            passwords,
            suffix: suffix.unwrap_or_default(),
        }
    }

    pub fn account(&self, remote_path: &str) -> CoreRsResult<String> {
        if let Some(account) = self.fixed_account {
            return Ok(account.to_owned());
        }
        let segments = || remote_path.split('/').filter(|segment| !segment.contains("fits"));
        segments()
            .rfind(|segment| segment.contains(self.stem.as_str()))
            .or_else(|| segments().rfind(|segment| segment.contains("eng")))
            .map(str::to_owned)
            .ok_or_else(|| {
                exception!(
                    code = error_code::REMOTE_ERROR,
                    message = format!("could not determine the account from path, path={remote_path}")
                )
            })
    }

    pub fn password(&self, account: &str) -> CoreRsResult<Password> {
        let number = account.trim_matches(|c| self.stem.contains(c));
        let password = if !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()) {
            let prefix = &self.passwords.numbered_prefix;
            let suffix = &self.passwords.numbered_suffix;
            format!("{prefix}{number:0>2}{suffix}")
        } else if account.contains("eng") {
            self.passwords.eng_account.clone()
        } else {
            return Err(exception!(
                code = error_code::REMOTE_ERROR,
                message = format!("could not determine the password for account, account={account}")
            ));
        };
        self.checked(account, password)
    }

    /// For accounts outside the naming scheme that share the engineering password, e.g. kpfguide.
    pub fn eng_password(&self, account: &str) -> CoreRsResult<Password> {
        self.checked(account, self.passwords.eng_account.clone())
    }

    fn checked(&self, account: &str, password: String) -> CoreRsResult<Password> {
        if password.is_empty() {
            return Err(exception!(
                code = error_code::REMOTE_ERROR,
                message = format!("password is not configured for account, account={account}")
            ));
        }
        Ok(Password(format!("{password}{}", self.suffix)))
    }
}
