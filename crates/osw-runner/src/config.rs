use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use osw_core::ChangeId;
use osw_gates::GateCommands;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub project: ProjectConfig,
    #[serde(default)]
    pub tools: GateCommands,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub main_branch: String,
    pub version_file: String,
    pub report_root: String,
}

/// Operator-supplied command vectors run at the Implementation and
/// Verification stages. Each entry is an argv, not a shell string.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CommandsConfig {
    #[serde(default)]
    pub implement: Vec<Vec<String>>,
    #[serde(default)]
    pub verify: Vec<Vec<String>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub band_workers: usize,
    pub band_task_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self { band_workers: 3, band_task_timeout_secs: 300 }
    }
}

impl Config {
    pub fn default_for_repo() -> Self {
        Self {
            project: ProjectConfig {
                main_branch: "main".to_string(),
                version_file: "VERSION".to_string(),
                report_root: ".openspec/reports".to_string(),
            },
            tools: GateCommands::default(),
            commands: CommandsConfig::default(),
            limits: LimitsConfig::default(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| "parse .openspec/config.toml")?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize config toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn load_or_default(repo_root: &Path) -> Result<Self> {
        let path = Self::config_path(repo_root);
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default_for_repo())
        }
    }

    pub fn config_path(repo_root: &Path) -> PathBuf {
        repo_root.join(".openspec").join("config.toml")
    }

    pub fn state_dir(repo_root: &Path) -> PathBuf {
        repo_root.join(".openspec").join("state")
    }

    pub fn report_dir(&self, repo_root: &Path, change_id: &ChangeId) -> PathBuf {
        let root = shellexpand::tilde(&self.project.report_root).to_string();
        let root = PathBuf::from(root);
        let root = if root.is_absolute() { root } else { repo_root.join(root) };
        root.join(change_id.as_str())
    }

    pub fn change_dir(repo_root: &Path, change_id: &ChangeId) -> PathBuf {
        repo_root
            .join("openspec")
            .join("changes")
            .join(change_id.as_str())
    }

    /// Worktree prefixes the workflow itself writes under; the clean-tree
    /// hook and the commit stage treat these as in-scope.
    pub fn workflow_prefixes(&self) -> Vec<String> {
        vec![
            "openspec/".to_string(),
            ".openspec/".to_string(),
            self.project.version_file.clone(),
        ]
    }
}
