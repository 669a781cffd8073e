//! Runtime settings: ledger location, id scheme, lock policy, rule set.
//!
//! Resolution order, later wins:
//! 1. built-in defaults
//! 2. the first config file found (`--config`, `./contentgate.yaml`,
//!    `./.contentgate.yaml`, then the per-user config directory)
//! 3. environment (`CONTENTGATE_LEDGER`, `CONTENTGATE_OPERATOR`)
//! 4. command-line flags, applied by the CLI

use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::rules::{self, RuleSet};
use crate::store::{IdScheme, Ledger, LockPolicy};

/// Config file names searched for in the working directory.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["contentgate.yaml", ".contentgate.yaml"];

pub const ENV_LEDGER: &str = "CONTENTGATE_LEDGER";
pub const ENV_OPERATOR: &str = "CONTENTGATE_OPERATOR";

/// Login-name variables consulted, in order, when no resolver is given.
pub const LOGIN_ENV_VARS: &[&str] = &["USER", "LOGNAME", "USERNAME"];

/// Settings file schema.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Path of the JSON-Lines ledger
    pub ledger: PathBuf,
    /// Rule set file; the built-in set is used when absent
    pub rules: Option<PathBuf>,
    pub id_prefix: String,
    pub id_width: usize,
    /// Default resolver recorded by `resolve` when `--by` is omitted
    pub operator: Option<String>,
    pub lock: LockPolicy,
    /// Where this config was read from, if anywhere
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ledger: PathBuf::from(".contentgate/issues.jsonl"),
            rules: None,
            id_prefix: "SC".to_string(),
            id_width: 3,
            operator: None,
            lock: LockPolicy::default(),
            source: None,
        }
    }
}

impl Config {
    /// Parse a config from a YAML file. Relative paths resolve against its directory.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        config.ledger = anchor(base, &config.ledger);
        config.rules = config.rules.as_deref().map(|r| anchor(base, r));
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Load settings, honouring an explicit path first.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::parse_file(path)?,
            None => match discover() {
                Some(path) => Self::parse_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        tracing::debug!(
            source = ?config.source,
            ledger = %config.ledger.display(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ledger) = lookup(ENV_LEDGER).filter(|v| !v.is_empty()) {
            self.ledger = PathBuf::from(ledger);
        }
        if let Some(operator) = lookup(ENV_OPERATOR).filter(|v| !v.trim().is_empty()) {
            self.operator = Some(operator);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ledger.as_os_str().is_empty() {
            anyhow::bail!("ledger path is empty");
        }
        if self.id_prefix.is_empty() || !self.id_prefix.chars().all(|c| c.is_ascii_alphanumeric())
        {
            anyhow::bail!(
                "id_prefix {:?} must be non-empty and alphanumeric",
                self.id_prefix
            );
        }
        if !self.id_prefix.starts_with(|c: char| c.is_ascii_alphabetic()) {
            anyhow::bail!("id_prefix {:?} must start with a letter", self.id_prefix);
        }
        if self.id_width == 0 || self.id_width > 9 {
            anyhow::bail!("id_width must be between 1 and 9, got {}", self.id_width);
        }
        Ok(())
    }

    /// Resolver recorded when `resolve` runs without `--by`: the configured
    /// operator, then the login name, then `git config user.name`.
    pub fn default_resolver(&self) -> Option<String> {
        self.resolver_from(|key| std::env::var(key).ok(), git_user_name)
    }

    pub fn resolver_from<E, G>(&self, env: E, git: G) -> Option<String>
    where
        E: Fn(&str) -> Option<String>,
        G: FnOnce() -> Option<String>,
    {
        non_blank(self.operator.clone())
            .or_else(|| LOGIN_ENV_VARS.iter().find_map(|key| non_blank(env(key))))
            .or_else(|| non_blank(git()))
    }

    /// Ledger handle configured with this id scheme and lock policy.
    pub fn ledger(&self) -> Ledger {
        Ledger::new(&self.ledger)
            .id_scheme(IdScheme {
                prefix: self.id_prefix.clone(),
                width: self.id_width,
            })
            .lock_policy(self.lock)
    }

    /// The configured rule set, or the built-in one. Always validated.
    pub fn rule_set(&self, explicit: Option<&Path>) -> anyhow::Result<RuleSet> {
        let rules = match explicit.or(self.rules.as_deref()) {
            Some(path) => RuleSet::parse_file(path)
                .with_context(|| format!("parsing rule set {}", path.display()))?,
            None => RuleSet::builtin(),
        };
        rules::validate(&rules)?;
        Ok(rules)
    }
}

/// First config file present in the working directory, then the user config dir.
pub fn discover() -> Option<PathBuf> {
    for name in DEFAULT_CONFIG_NAMES {
        let path = PathBuf::from(name);
        if path.exists() {
            return Some(path);
        }
    }
    ProjectDirs::from("", "", "contentgate")
        .map(|dirs| dirs.config_dir().join("config.yaml"))
        .filter(|p| p.exists())
}

fn git_user_name() -> Option<String> {
    let output = Command::new("git")
        .args(["config", "user.name"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn anchor(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() || base.as_os_str().is_empty() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
