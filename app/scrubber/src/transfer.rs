use std::path::Path;
use std::path::PathBuf;

use framework::fs::path::PathExt as _;
use framework::fs::tree;
use framework::log;
use framework::shell;
use framework::shell::ShellCommand;
use tracing::info;
use tracing::warn;

pub use directory::DirectoryCache;
pub use remote::DeleteKind;
pub use remote::MountOps;
pub use remote::PasswordSshOps;
pub use remote::RemoteFileOps;
pub use remote::RemoteTransport;
pub use remote::SshOps;

mod directory;
mod remote;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Copy,
    Move,
}

/// Which entries of a source directory rsync picks up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RsyncFilter {
    All,
    // files starting with the prefix, keeps siblings sharing the directory out
    Prefix(String),
    Fits,
}

#[derive(Debug)]
pub struct TransferTask {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub mode: TransferMode,
    pub filter: RsyncFilter,
}

/// Delete only transfer, `local` is the scrubber's view of `remote`.
#[derive(Debug)]
pub struct DeleteTask {
    pub local: PathBuf,
    pub remote: String,
    pub kind: DeleteKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Moved,
    // already handled by a previous run
    SkippedMissing,
    Failed,
}

impl TransferOutcome {
    pub fn is_moved(self) -> bool {
        self == TransferOutcome::Moved
    }
}

pub struct TransferExecutor {
    root: PathBuf,
    directories: DirectoryCache,
}

impl TransferExecutor {
    /// `root` is where destination directories are created from, e.g. the storage mount.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        TransferExecutor {
            root: root.into(),
            directories: DirectoryCache::default(),
        }
    }

    pub async fn transfer(&mut self, task: &TransferTask) -> TransferOutcome {
        let Some(source) = resolve_source(&task.source) else {
            info!(source = %task.source.display(), "skipping, already moved or does not exist");
            return TransferOutcome::SkippedMissing;
        };

        if let Err(e) = self.directories.ensure(&self.root, &task.destination) {
            log::log_exception(&e);
            return TransferOutcome::Failed;
        }

        let command = rsync_command(&source, &task.destination, task.mode, &task.filter);
        info!(command = %command, "rsync files");
        if let Err(e) = shell::run(&command).await {
            warn!(source = %source.display(), "rsync failed, error={}", e.message);
            return TransferOutcome::Failed;
        }

        if task.mode == TransferMode::Move && source.is_dir() {
            tree::prune_empty_dirs(&source);
        }
        TransferOutcome::Moved
    }
}

pub async fn delete<R>(ops: &R, task: &DeleteTask) -> TransferOutcome
where
    R: RemoteFileOps,
{
    let Some(local) = resolve_source(&task.local) else {
        info!(path = %task.local.display(), "skipping, moved or does not exist");
        return TransferOutcome::SkippedMissing;
    };
    let remote = if local == task.local {
        task.remote.clone()
    } else {
        format!("{}.gz", task.remote)
    };

    match ops.delete(&remote, task.kind).await {
        Ok(()) => {
            info!(path = %remote, "removed");
            TransferOutcome::Moved
        }
        Err(e) => {
            warn!(path = %remote, "failed to remove, error={}", e.message);
            TransferOutcome::Failed
        }
    }
}

// a fits file missing at the source may have been gzipped by the pipeline since the query
fn resolve_source(source: &Path) -> Option<PathBuf> {
    if source.exists() {
        return Some(source.to_path_buf());
    }
    if source.is_compressible_fits() {
        let compressed = PathBuf::from(format!("{}.gz", source.display()));
        if compressed.exists() {
            return Some(compressed);
        }
    }
    None
}

fn rsync_command(source: &Path, destination: &Path, mode: TransferMode, filter: &RsyncFilter) -> ShellCommand {
    let mut command = ShellCommand::new("rsync").arg("-av");
    if mode == TransferMode::Move {
        command = command.arg("--remove-source-files");
    }
    match filter {
        RsyncFilter::All => {}
        RsyncFilter::Prefix(prefix) => {
            let include = format!("{prefix}*");
            command = command.args(["--include", include.as_str(), "--exclude", "*"]);
        }
        RsyncFilter::Fits => {
            command = command.args(["--include", "*fits*", "--exclude", "*"]);
        }
    }
    let source = if source.is_dir() {
        dir_arg(source)
    } else {
        source.display().to_string()
    };
    command.arg(source).arg(dir_arg(destination))
}

fn dir_arg(path: &Path) -> String {
    format!("{}/", path.display().to_string().trim_end_matches('/'))
}
