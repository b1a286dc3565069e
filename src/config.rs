// ⚙️ Scanner Configuration - JSON file + environment
// The file says which senders to scan and how to read their emails;
// the environment says where the files live.

use crate::error::ConfigError;
use crate::reconciliation::DuplicateWindow;
use crate::resolver::MatchThresholds;
use crate::rules::{ProcessingRule, RuleSet};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// CONFIG FILE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerConfig {
    pub process_emails: Vec<MailboxRules>,

    #[serde(default)]
    pub matching: MatchThresholds,

    #[serde(default)]
    pub duplicate_window: DuplicateWindow,

    /// How far back to load ledger history for duplicate checks (default: 120)
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
}

fn default_lookback_days() -> i64 {
    120
}

/// Rules for the emails of one sender
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxRules {
    pub from_email: String,

    #[serde(default)]
    pub processing_steps: Vec<ProcessingRule>,
}

impl ScannerConfig {
    /// Load config from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: ScannerConfig =
            serde_json::from_str(content).context("Failed to parse config JSON")?;
        Ok(config)
    }

    /// Compile every sender's rules and validate thresholds
    pub fn compile(&self) -> Result<CompiledConfig, ConfigError> {
        self.matching.validate()?;

        if self.lookback_days < 0 {
            return Err(ConfigError::InvalidThreshold(format!(
                "lookbackDays must not be negative, got {}",
                self.lookback_days
            )));
        }
        if self.duplicate_window.days_before < 0 || self.duplicate_window.days_after < 0 {
            return Err(ConfigError::InvalidThreshold(
                "duplicateWindow days must not be negative".to_string(),
            ));
        }

        let mailboxes = self
            .process_emails
            .iter()
            .map(|mailbox| -> Result<CompiledMailbox, ConfigError> {
                Ok(CompiledMailbox {
                    from_email: mailbox.from_email.clone(),
                    rules: RuleSet::compile(&mailbox.processing_steps)?,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(CompiledConfig {
            mailboxes,
            matching: self.matching,
            duplicate_window: self.duplicate_window,
            lookback_days: self.lookback_days,
        })
    }
}

// ============================================================================
// COMPILED CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct CompiledMailbox {
    pub from_email: String,
    pub rules: RuleSet,
}

/// Validated configuration, immutable for the rest of the process
#[derive(Debug, Clone)]
pub struct CompiledConfig {
    pub mailboxes: Vec<CompiledMailbox>,
    pub matching: MatchThresholds,
    pub duplicate_window: DuplicateWindow,
    pub lookback_days: i64,
}

impl CompiledConfig {
    pub fn rule_count(&self) -> usize {
        self.mailboxes.iter().map(|m| m.rules.rule_count()).sum()
    }
}

// ============================================================================
// ENVIRONMENT
// ============================================================================

/// Paths and URLs taken from the environment
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub config_path: PathBuf,
    pub db_path: PathBuf,
    pub maildir: PathBuf,
    pub ledger_url: String,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from any key lookup (used by tests)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Settings {
            config_path: PathBuf::from(get("MAIL_LEDGER_CONFIG", "config.json")),
            db_path: PathBuf::from(get("MAIL_LEDGER_DB", "ledger.db")),
            maildir: PathBuf::from(get("MAIL_LEDGER_MAILDIR", "mail")),
            ledger_url: get("LEDGER_URL", "").trim_end_matches('/').to_string(),
        }
    }
}
