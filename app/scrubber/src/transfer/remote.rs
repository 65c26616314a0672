use std::fs;
use std::path::PathBuf;

use framework::exception;
use framework::exception::CoreRsResult;
use framework::exception::error_code;
use framework::fs::tree;
use framework::shell;
use framework::shell::ShellCommand;
use tracing::info;

use crate::credential::Password;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteKind {
    File,
    Recursive,
    EmptyDir,
}

/// File operations on a host the scrubber cannot always reach through a mount.
/// Paths are in the remote host's view.
pub trait RemoteFileOps {
    async fn delete(&self, path: &str, kind: DeleteKind) -> CoreRsResult<()>;

    async fn mkdir(&self, path: &str) -> CoreRsResult<()>;

    async fn exists(&self, path: &str) -> CoreRsResult<bool>;

    async fn count_files(&self, path: &str) -> CoreRsResult<u64>;
}

/// Remote filesystem reached through a local mount, e.g. /net/kcwiserver.
pub struct MountOps {
    root: PathBuf,
    dry_run: bool,
}

impl MountOps {
    pub fn new(root: impl Into<PathBuf>, dry_run: bool) -> Self {
        MountOps {
            root: root.into(),
            dry_run,
        }
    }

    fn local(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl RemoteFileOps for MountOps {
    async fn delete(&self, path: &str, kind: DeleteKind) -> CoreRsResult<()> {
        let local = self.local(path);
        if self.dry_run {
            info!(path = %local.display(), ?kind, "dev mode, delete skipped");
            return Ok(());
        }
        let result = match kind {
            DeleteKind::File => fs::remove_file(&local),
            DeleteKind::Recursive => fs::remove_dir_all(&local),
            DeleteKind::EmptyDir => fs::remove_dir(&local),
        };
        result.map_err(|err| {
            exception!(
                code = error_code::REMOTE_ERROR,
                message = format!("failed to delete, path={}", local.display()),
                source = err
            )
        })
    }

    async fn mkdir(&self, path: &str) -> CoreRsResult<()> {
        let local = self.local(path);
        fs::create_dir_all(&local).map_err(|err| {
            exception!(
                code = error_code::REMOTE_ERROR,
                message = format!("failed to create directory, path={}", local.display()),
                source = err
            )
        })
    }

    async fn exists(&self, path: &str) -> CoreRsResult<bool> {
        Ok(self.local(path).exists())
    }

    async fn count_files(&self, path: &str) -> CoreRsResult<u64> {
        Ok(tree::count_files(&self.local(path)))
    }
}

/// ssh with key based authentication.
pub struct SshOps {
    login: String,
    dry_run: bool,
}

impl SshOps {
    pub fn new(user: &str, host: &str, dry_run: bool) -> Self {
        SshOps {
            login: format!("{user}@{host}"),
            dry_run,
        }
    }
}

impl RemoteFileOps for SshOps {
    async fn delete(&self, path: &str, kind: DeleteKind) -> CoreRsResult<()> {
        execute(&ssh_command(&self.login, &delete_command(path, kind), None), self.dry_run).await
    }

    async fn mkdir(&self, path: &str) -> CoreRsResult<()> {
        execute(&ssh_command(&self.login, &format!("/bin/mkdir -p {path}"), None), self.dry_run).await
    }

    async fn exists(&self, path: &str) -> CoreRsResult<bool> {
        exists(&ssh_command(&self.login, &format!("test -e {path}"), None)).await
    }

    async fn count_files(&self, path: &str) -> CoreRsResult<u64> {
        count_files(&ssh_command(&self.login, &format!("find {path} -type f | wc -l"), None)).await
    }
}

/// Legacy transport for instrument accounts without a key trust relationship.
/// The password reaches sshpass through its environment, never the command line or the log.
/// Replace with key based authentication once the instrument hosts allow it.
pub struct PasswordSshOps {
    login: String,
    password: Password,
    dry_run: bool,
}

impl PasswordSshOps {
    pub fn new(account: &str, host: &str, password: Password, dry_run: bool) -> Self {
        PasswordSshOps {
            login: format!("{account}@{host}"),
            password,
            dry_run,
        }
    }
}

impl RemoteFileOps for PasswordSshOps {
    async fn delete(&self, path: &str, kind: DeleteKind) -> CoreRsResult<()> {
        let command = ssh_command(&self.login, &delete_command(path, kind), Some(&self.password));
        execute(&command, self.dry_run).await
    }

    async fn mkdir(&self, path: &str) -> CoreRsResult<()> {
        let command = ssh_command(&self.login, &format!("/bin/mkdir -p {path}"), Some(&self.password));
        execute(&command, self.dry_run).await
    }

    async fn exists(&self, path: &str) -> CoreRsResult<bool> {
        exists(&ssh_command(&self.login, &format!("test -e {path}"), Some(&self.password))).await
    }

    async fn count_files(&self, path: &str) -> CoreRsResult<u64> {
        let command = ssh_command(&self.login, &format!("find {path} -type f | wc -l"), Some(&self.password));
        count_files(&command).await
    }
}

/// One of the configured transports, chosen per instrument.
pub enum RemoteTransport {
    Mount(MountOps),
    SshKey(SshOps),
    Password(PasswordSshOps),
}

impl RemoteFileOps for RemoteTransport {
    async fn delete(&self, path: &str, kind: DeleteKind) -> CoreRsResult<()> {
        match self {
            RemoteTransport::Mount(ops) => ops.delete(path, kind).await,
            RemoteTransport::SshKey(ops) => ops.delete(path, kind).await,
            RemoteTransport::Password(ops) => ops.delete(path, kind).await,
        }
    }

    async fn mkdir(&self, path: &str) -> CoreRsResult<()> {
        match self {
            RemoteTransport::Mount(ops) => ops.mkdir(path).await,
            RemoteTransport::SshKey(ops) => ops.mkdir(path).await,
            RemoteTransport::Password(ops) => ops.mkdir(path).await,
        }
    }

    async fn exists(&self, path: &str) -> CoreRsResult<bool> {
        match self {
            RemoteTransport::Mount(ops) => ops.exists(path).await,
            RemoteTransport::SshKey(ops) => ops.exists(path).await,
            RemoteTransport::Password(ops) => ops.exists(path).await,
        }
    }

    async fn count_files(&self, path: &str) -> CoreRsResult<u64> {
        match self {
            RemoteTransport::Mount(ops) => ops.count_files(path).await,
            RemoteTransport::SshKey(ops) => ops.count_files(path).await,
            RemoteTransport::Password(ops) => ops.count_files(path).await,
        }
    }
}

fn delete_command(path: &str, kind: DeleteKind) -> String {
    match kind {
        DeleteKind::File => format!("/bin/rm {path}"),
        DeleteKind::Recursive => format!("/bin/rm -r {path}"),
        DeleteKind::EmptyDir => format!("/bin/rmdir {path}"),
    }
}

fn ssh_command(login: &str, remote: &str, password: Option<&Password>) -> ShellCommand {
    let ssh_args = ["-o", "StrictHostKeyChecking=no", "-o", "ConnectTimeout=30", login, remote];
    match password {
        Some(password) => ShellCommand::new("sshpass")
            .args(["-e", "ssh"])
            .args(ssh_args)
            .secret_env("SSHPASS", password.expose()),
        None => ShellCommand::new("ssh").args(["-o", "BatchMode=yes"]).args(ssh_args),
    }
}

async fn execute(command: &ShellCommand, dry_run: bool) -> CoreRsResult<()> {
    info!(command = %command, "remote command");
    if dry_run {
        info!("dev mode, remote command not executed");
        return Ok(());
    }
    shell::run(command).await.map(|_| ()).map_err(|err| {
        exception!(
            code = error_code::REMOTE_ERROR,
            message = format!("remote command failed, command={command}"),
            source = err
        )
    })
}

// ssh exits with 255 on connection errors, test -e with 1 for a missing path
const MISSING_PATH_STATUS: i32 = 1;

async fn exists(command: &ShellCommand) -> CoreRsResult<bool> {
    let output = shell::output(command).await.map_err(|err| {
        exception!(
            code = error_code::REMOTE_ERROR,
            message = format!("remote exists check failed, command={command}"),
            source = err
        )
    })?;
    match output.status {
        Some(0) => Ok(true),
        Some(MISSING_PATH_STATUS) => Ok(false),
        status => Err(exception!(
            code = error_code::REMOTE_ERROR,
            message = format!(
                "remote exists check failed, command={command}, status={}, stderr={}",
                status.unwrap_or(-1),
                output.stderr.trim()
            )
        )),
    }
}

async fn count_files(command: &ShellCommand) -> CoreRsResult<u64> {
    let output = shell::run(command).await?;
    output.trim().parse::<u64>().map_err(|err| {
        exception!(
            code = error_code::REMOTE_ERROR,
            message = format!("unexpected file count, output={}", output.trim()),
            source = err
        )
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use indexmap::IndexMap;

    use framework::exception::error_code;
    use framework::shell::ShellCommand;

    use super::DeleteKind;
    use super::MountOps;
    use super::RemoteFileOps;
    use super::ssh_command;
    use crate::config::PasswordConfig;
    use crate::credential::CredentialResolver;

    #[tokio::test]
    async fn mount_ops() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("net/kcwiserver");
        let night = root.join("sdata1400/kcwi1/2021jan16");
        fs::create_dir_all(night.join("executedMasks")).unwrap();
        fs::write(night.join("kb210116_00094.fits"), b"data").unwrap();
        fs::write(night.join("executedMasks/mask.fits"), b"mask").unwrap();
        let ops = MountOps::new(&root, false);

        assert!(ops.exists("/sdata1400/kcwi1/2021jan16/kb210116_00094.fits").await.unwrap());
        assert_eq!(ops.count_files("/sdata1400/kcwi1/2021jan16").await.unwrap(), 2);

        ops.delete("/sdata1400/kcwi1/2021jan16/executedMasks", DeleteKind::Recursive).await.unwrap();
        ops.delete("/sdata1400/kcwi1/2021jan16/kb210116_00094.fits", DeleteKind::File).await.unwrap();
        ops.delete("/sdata1400/kcwi1/2021jan16", DeleteKind::EmptyDir).await.unwrap();

        assert!(!night.exists());
        assert!(ops.delete("/sdata1400/kcwi1/2021jan16", DeleteKind::EmptyDir).await.is_err());
    }

    #[tokio::test]
    async fn exists_by_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("kb210116_00094.fits"), b"data").unwrap();
        let test = |name: &str| {
            let path = dir.path().join(name).display().to_string();
            ShellCommand::new("test").args(["-e".to_owned(), path])
        };

        assert!(super::exists(&test("kb210116_00094.fits")).await.unwrap());
        assert!(!super::exists(&test("kb210116_00095.fits")).await.unwrap());

        // e.g. ssh failing to connect
        let unreachable = ShellCommand::new("sh").args(["-c", "echo status=1, >&2; exit 255"]);
        let result = super::exists(&unreachable).await;
        assert!(result.is_err_and(|err| err.has_code(error_code::REMOTE_ERROR)));
    }

    #[tokio::test]
    async fn mount_ops_dry_run() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("kb210116_00094.fits"), b"data").unwrap();
        let ops = MountOps::new(dir.path(), true);

        ops.delete("/kb210116_00094.fits", DeleteKind::File).await.unwrap();

        assert!(dir.path().join("kb210116_00094.fits").exists());
    }

    #[test]
    fn password_never_on_command_line() {
        let passwords = PasswordConfig {
            numbered_prefix: "secret".to_owned(),
            numbered_suffix: String::new(),
            eng_account: String::new(),
            suffix: IndexMap::new(),
        };
        let resolver = CredentialResolver::new("kcwi", None, &passwords, None);
        let password = resolver.password("kcwi1").unwrap();

        let command = ssh_command("kcwi1@kcwiserver", "/bin/rm /sdata1400/kcwi1/kb.fits", Some(&password));

        assert_eq!(command.program(), "sshpass");
        assert!(command.arguments().iter().all(|arg| !arg.contains("secret")));
        assert!(!command.to_string().contains("secret"));
        assert_eq!(
            command.arguments().last().map(String::as_str),
            Some("/bin/rm /sdata1400/kcwi1/kb.fits")
        );
    }

    #[test]
    fn key_based_command() {
        let command = ssh_command("koaadmin@storageserver", "find /koastorage04/KCWI -type f | wc -l", None);
        assert_eq!(
            command.to_string(),
            "ssh -o BatchMode=yes -o StrictHostKeyChecking=no -o ConnectTimeout=30 koaadmin@storageserver find /koastorage04/KCWI -type f | wc -l"
        );
    }
}
