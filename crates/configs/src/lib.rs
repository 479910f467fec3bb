use anyhow::Result;
use serde::Deserialize;
use anyhow::anyhow;

/// How read-only enumeration calls (entity listing, queue counts) react to
/// backend failures.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log the failure and return whatever was gathered (possibly nothing).
    #[default]
    BestEffort,
    /// Surface the failure to the caller.
    Strict,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the local storage account. `None` keeps everything in memory.
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default = "default_table_name")]
    pub table_name: String,
    #[serde(default = "default_queue_name")]
    pub queue_name: String,
    #[serde(default = "default_share_name")]
    pub share_name: String,
    #[serde(default)]
    pub list_policy: FailurePolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            table_name: default_table_name(),
            queue_name: default_queue_name(),
            share_name: default_share_name(),
            list_policy: FailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: u64,
    #[serde(default = "default_backoff")]
    pub backoff_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub mirror_to_share: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            visibility_timeout_secs: default_visibility_timeout(),
            backoff_secs: default_backoff(),
            poll_interval_ms: default_poll_interval(),
            mirror_to_share: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AdminConfig {
    #[serde(default)]
    pub addr: Option<String>,
}

fn default_table_name() -> String { "abcretail".into() }
fn default_queue_name() -> String { "product-operations".into() }
fn default_share_name() -> String { "abcretail-logs".into() }
fn default_batch_size() -> usize { 10 }
fn default_visibility_timeout() -> u64 { 30 }
fn default_backoff() -> u64 { 10 }
fn default_poll_interval() -> u64 { 1000 }

/// Upper bound the queue service accepts for a single receive/peek.
pub const MAX_QUEUE_BATCH: usize = 32;

pub fn load_default() -> Result<AppConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    load_from_file(&path)
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    load_from_str(&content)
}

pub fn load_from_str(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

impl AppConfig {
    /// Load `config.toml` (or `CONFIG_PATH`); a missing file falls back to defaults.
    pub fn load_and_validate() -> Result<Self> {
        let mut cfg = match load_default() {
            Ok(cfg) => cfg,
            Err(e) if is_missing_file(&e) => AppConfig::default(),
            Err(e) => return Err(e),
        };
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.storage.normalize_from_env();
        self.storage.validate()?;
        self.audit.validate()?;
        if let Some(addr) = &self.admin.addr {
            if addr.trim().is_empty() {
                self.admin.addr = None;
            }
        }
        Ok(())
    }
}

fn is_missing_file(e: &anyhow::Error) -> bool {
    e.downcast_ref::<std::io::Error>()
        .map(|io| io.kind() == std::io::ErrorKind::NotFound)
        .unwrap_or(false)
}

impl StorageConfig {
    pub fn normalize_from_env(&mut self) {
        if self.data_dir.as_deref().map(str::trim).unwrap_or_default().is_empty() {
            self.data_dir = std::env::var("STORAGE_DATA_DIR").ok().filter(|d| !d.trim().is_empty());
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("storage.table_name", &self.table_name),
            ("storage.queue_name", &self.queue_name),
            ("storage.share_name", &self.share_name),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("{field} must not be empty"));
            }
        }
        if !self.queue_name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            return Err(anyhow!("storage.queue_name may only contain lowercase letters, digits and '-'"));
        }
        Ok(())
    }
}

impl AuditConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.batch_size > MAX_QUEUE_BATCH {
            return Err(anyhow!("audit.batch_size must be within 1..={MAX_QUEUE_BATCH}"));
        }
        if self.visibility_timeout_secs == 0 {
            return Err(anyhow!("audit.visibility_timeout_secs must be a positive number of seconds"));
        }
        if self.poll_interval_ms == 0 {
            return Err(anyhow!("audit.poll_interval_ms must be positive"));
        }
        Ok(())
    }

    pub fn visibility_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn backoff(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.backoff_secs)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let mut cfg = load_from_str("").unwrap();
        cfg.normalize_and_validate().unwrap();
        assert_eq!(cfg.storage.queue_name, "product-operations");
        assert_eq!(cfg.storage.list_policy, FailurePolicy::BestEffort);
        assert_eq!(cfg.audit.batch_size, 10);
        assert_eq!(cfg.audit.visibility_timeout(), std::time::Duration::from_secs(30));
        assert_eq!(cfg.audit.backoff(), std::time::Duration::from_secs(10));
    }

    #[test]
    fn parses_sections() {
        let cfg = load_from_str(
            r#"
            [storage]
            data_dir = "/var/lib/retail"
            queue_name = "customer-logs"
            list_policy = "strict"

            [audit]
            batch_size = 5
            mirror_to_share = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.storage.data_dir.as_deref(), Some("/var/lib/retail"));
        assert_eq!(cfg.storage.list_policy, FailurePolicy::Strict);
        assert_eq!(cfg.audit.batch_size, 5);
        assert!(cfg.audit.mirror_to_share);
        assert_eq!(cfg.audit.poll_interval_ms, 1000);
    }

    #[test]
    fn rejects_out_of_range_batch() {
        let mut cfg = load_from_str("[audit]\nbatch_size = 64\n").unwrap();
        assert!(cfg.normalize_and_validate().is_err());
    }

    #[test]
    fn rejects_invalid_queue_name() {
        let mut cfg = load_from_str("[storage]\nqueue_name = \"Product_Ops\"\n").unwrap();
        assert!(cfg.normalize_and_validate().is_err());
    }
}
