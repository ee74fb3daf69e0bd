// Git Checkout Manager

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tagsmith_core::error::{AppError, Result};
use tagsmith_core::port::CheckoutManager;
use tokio::process::Command;
use tracing::{debug, info};

const DEFAULT_BRANCH: &str = "main";

struct ExecResult {
    stdout: String,
    stderr: String,
    success: bool,
}

impl ExecResult {
    fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Keeps one checkout per repository id under the workspace root. New
/// repositories are shallow-cloned on the default branch; existing
/// checkouts are fetched and reset to the remote branch, falling back to
/// a fast-forward pull when the remote branch ref is not resolvable.
pub struct GitCheckoutManager {
    workspace_root: PathBuf,
}

impl GitCheckoutManager {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }

    async fn exec(&self, dir: &Path, args: &[&str]) -> Result<ExecResult> {
        debug!(dir = %dir.display(), args = ?args, "git");
        let output = Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                AppError::Subprocess(format!("failed to spawn git {}: {e}", args.join(" ")))
            })?;

        Ok(ExecResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
        })
    }

    async fn exec_ok(&self, dir: &Path, args: &[&str]) -> Result<()> {
        let result = self.exec(dir, args).await?;
        if !result.success {
            return Err(AppError::Subprocess(format!(
                "git {} failed: {}",
                args.join(" "),
                result.combined_output().trim()
            )));
        }
        Ok(())
    }

    async fn clone_shallow(&self, repo_url: &str, branch: &str, target: &Path) -> Result<()> {
        info!(repo_url = %repo_url, branch = %branch, target = %target.display(), "Shallow cloning");
        self.exec_ok(
            &self.workspace_root,
            &[
                "clone",
                "--depth",
                "1",
                "--branch",
                branch,
                repo_url,
                &target.to_string_lossy(),
            ],
        )
        .await
    }

    async fn refresh(&self, checkout: &Path, branch: &str) -> Result<()> {
        self.exec_ok(checkout, &["fetch", "--all", "--prune"]).await?;

        let remote_ref = format!("origin/{branch}");
        let resolvable = self
            .exec(checkout, &["rev-parse", "--verify", &remote_ref])
            .await?
            .success;

        if resolvable {
            self.exec_ok(checkout, &["reset", "--hard", &remote_ref]).await
        } else {
            debug!(remote_ref = %remote_ref, "Remote branch not resolvable, trying ff-only pull");
            self.exec_ok(checkout, &["pull", "--ff-only"]).await
        }
    }
}

#[async_trait]
impl CheckoutManager for GitCheckoutManager {
    async fn ensure_checkout(
        &self,
        repository_id: &str,
        repo_url: &str,
        default_branch: Option<&str>,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.workspace_root).await?;

        let checkout = self.workspace_root.join(repository_id);
        let branch = default_branch
            .filter(|b| !b.is_empty())
            .unwrap_or(DEFAULT_BRANCH);

        if checkout.join(".git").exists() {
            debug!(repository_id = %repository_id, "Refreshing existing checkout");
            self.refresh(&checkout, branch).await?;
        } else {
            self.clone_shallow(repo_url, branch, &checkout).await?;
        }

        Ok(checkout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_origin(dir: &Path) -> PathBuf {
        let origin = dir.join("origin");
        std::fs::create_dir_all(&origin).unwrap();
        let run = |args: &[&str]| {
            let status = std::process::Command::new("git")
                .arg("-C")
                .arg(&origin)
                .args(args)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .unwrap();
            assert!(status.success(), "git {args:?} failed");
        };
        run(&["init", "--initial-branch", "main"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "Test"]);
        std::fs::write(origin.join("README.md"), "# origin\n").unwrap();
        run(&["add", "-A"]);
        run(&["commit", "-m", "initial"]);
        origin
    }

    #[tokio::test]
    async fn clones_then_refreshes() {
        let dir = tempfile::tempdir().unwrap();
        let origin = init_origin(dir.path());
        let workspace = dir.path().join("workspace");

        let manager = GitCheckoutManager::new(&workspace);
        let checkout = manager
            .ensure_checkout("repo-1", &origin.to_string_lossy(), Some("main"))
            .await
            .unwrap();
        assert!(checkout.join("README.md").exists());

        // Second call takes the refresh path.
        let again = manager
            .ensure_checkout("repo-1", &origin.to_string_lossy(), Some("main"))
            .await
            .unwrap();
        assert_eq!(checkout, again);
    }

    #[tokio::test]
    async fn clone_failure_is_a_subprocess_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = GitCheckoutManager::new(dir.path().join("workspace"));

        let result = manager
            .ensure_checkout("repo-x", "/nonexistent/origin.git", None)
            .await;
        assert!(matches!(result, Err(AppError::Subprocess(_))));
    }
}
