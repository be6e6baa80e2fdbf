//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{ArsError, Result};
use crate::core::paths::resolve_absolute_path;

/// Direct single-request submission limit (T_small).
pub const DEFAULT_DIRECT_UPLOAD_MAX_BYTES: u64 = 32 * 1024 * 1024;
/// Largest artifact the lookup service accepts through the upload-handle route (T_max).
pub const DEFAULT_UPLOAD_MAX_BYTES: u64 = 650 * 1024 * 1024;

/// Full scanner configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub transport: TransportConfig,
    pub scan: ScanConfig,
    pub retry: RetryConfig,
    pub upload: UploadConfig,
    pub layout: LayoutConfig,
    pub lists: ListsConfig,
    pub logging: LoggingConfig,
    pub policy: PolicyConfig,
    pub paths: PathsConfig,
}

/// Lookup-service endpoint and credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    /// Inline API key. Prefer `key_env`; an inline key wins when non-empty.
    pub key: String,
    /// Environment variable holding the API key.
    pub key_env: String,
    pub base_url: String,
    /// Human-facing report page prefix; the fingerprint is appended.
    pub gui_url: String,
    pub connect_timeout_secs: u64,
    pub lookup_timeout_secs: u64,
    pub upload_timeout_secs: u64,
    pub large_upload_timeout_secs: u64,
}

/// Which transport implementation to use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Managed client first, raw HTTP if the managed client cannot start.
    #[default]
    Auto,
    /// Managed client only.
    Managed,
    /// Raw HTTP (curl) only.
    Raw,
}

/// Transport selection knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransportConfig {
    pub mode: TransportMode,
    /// Binary used by the raw-HTTP transport.
    pub curl_binary: String,
}

/// Candidate enumeration and pacing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScanConfig {
    /// Flat source directories, scanned in order, non-recursively.
    pub directories: Vec<PathBuf>,
    /// Accepted file extensions (case-insensitive). Empty accepts every file.
    pub extensions: Vec<String>,
    /// Pause between artifacts to stay inside the lookup quota.
    pub pacing_secs: u64,
}

/// Rate-limit backoff.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub rate_limit_wait_secs: u64,
    /// Retries after the first rate-limited attempt before giving up.
    pub max_rate_limit_retries: u32,
}

/// Submission of artifacts the lookup service has never seen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UploadConfig {
    pub enabled: bool,
    pub direct_max_bytes: u64,
    pub max_bytes: u64,
}

/// Disposition directory tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LayoutConfig {
    pub base_dir: PathBuf,
    pub clean_dir: String,
    pub infected_dir: String,
    pub too_large_dir: String,
    pub pending_dir: String,
    pub reports_dir: String,
    pub logs_dir: String,
}

/// Allow/deny detection list files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ListsConfig {
    pub allow_file: PathBuf,
    pub deny_file: PathBuf,
}

/// Session log retention and JSONL rotation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub retention_days: u64,
    pub jsonl_max_bytes: u64,
    pub jsonl_max_rotated: u32,
    pub jsonl_fallback: Option<PathBuf>,
}

/// Keyword heuristic for detection labels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PolicyConfig {
    pub malicious_keywords: Vec<String>,
    pub safe_keywords: Vec<String>,
}

/// Filesystem paths used by arscan itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[ARS-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

fn config_dir() -> PathBuf {
    home_dir().join(".config").join("arscan")
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            key_env: "VT_API_KEY".to_string(),
            base_url: "https://www.virustotal.com/api/v3".to_string(),
            gui_url: "https://www.virustotal.com/gui/file".to_string(),
            connect_timeout_secs: 15,
            lookup_timeout_secs: 30,
            upload_timeout_secs: 600,
            large_upload_timeout_secs: 900,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::Auto,
            curl_binary: "curl".to_string(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        let downloads = home_dir().join("Downloads");
        Self {
            directories: vec![downloads],
            extensions: vec!["apk".to_string()],
            pacing_secs: 15,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            rate_limit_wait_secs: 60,
            max_rate_limit_retries: 5,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            direct_max_bytes: DEFAULT_DIRECT_UPLOAD_MAX_BYTES,
            max_bytes: DEFAULT_UPLOAD_MAX_BYTES,
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            base_dir: home_dir().join("Downloads").join("APKs"),
            clean_dir: "Clean_and_Safe".to_string(),
            infected_dir: "Infected_and_High_Risk".to_string(),
            too_large_dir: "Too_Large_For_Lookup".to_string(),
            pending_dir: "Pending_Manual_Review".to_string(),
            reports_dir: "Scan_Results".to_string(),
            logs_dir: "Scan_Logs".to_string(),
        }
    }
}

impl Default for ListsConfig {
    fn default() -> Self {
        let dir = config_dir();
        Self {
            allow_file: dir.join("allowlist.json"),
            deny_file: dir.join("denylist.json"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            retention_days: 3,
            jsonl_max_bytes: 16 * 1024 * 1024,
            jsonl_max_rotated: 3,
            jsonl_fallback: None,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            malicious_keywords: [
                "trojan",
                "virus",
                "malware",
                "worm",
                "backdoor",
                "exploit",
                "ransomware",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            safe_keywords: [
                "pup",
                "pua",
                "riskware",
                "potentially unwanted",
                "potentially-unwanted",
                "unwanted",
                "adware",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_file: config_dir().join("config.toml"),
        }
    }
}

impl ApiConfig {
    #[must_use]
    pub const fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub const fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    #[must_use]
    pub const fn large_upload_timeout(&self) -> Duration {
        Duration::from_secs(self.large_upload_timeout_secs)
    }

    /// Report page for one fingerprint.
    #[must_use]
    pub fn gui_link(&self, fingerprint: &str) -> String {
        format!("{}/{fingerprint}", self.gui_url.trim_end_matches('/'))
    }
}

impl LayoutConfig {
    #[must_use]
    pub fn clean_path(&self) -> PathBuf {
        self.base_dir.join(&self.clean_dir)
    }

    #[must_use]
    pub fn infected_path(&self) -> PathBuf {
        self.base_dir.join(&self.infected_dir)
    }

    #[must_use]
    pub fn too_large_path(&self) -> PathBuf {
        self.base_dir.join(&self.too_large_dir)
    }

    #[must_use]
    pub fn pending_path(&self) -> PathBuf {
        self.base_dir.join(&self.pending_dir)
    }

    #[must_use]
    pub fn reports_path(&self) -> PathBuf {
        self.base_dir.join(&self.reports_dir)
    }

    #[must_use]
    pub fn logs_path(&self) -> PathBuf {
        self.base_dir.join(&self.logs_dir)
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| ArsError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(ArsError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a over the canonical JSON form, with the inline API key blanked.
    pub fn stable_hash(&self) -> Result<String> {
        let mut redacted = self.clone();
        redacted.api.key.clear();
        let canonical = serde_json::to_string(&redacted)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Resolve the API key: inline `api.key` first, then the `api.key_env` variable.
    pub fn api_key(&self) -> Result<String> {
        self.api_key_from(env_var)
    }

    fn api_key_from<F>(&self, mut lookup: F) -> Result<String>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let inline = self.api.key.trim();
        if !inline.is_empty() {
            return Ok(inline.to_string());
        }
        lookup(&self.api.key_env)
            .map(|raw| raw.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ArsError::MissingCredentials {
                env_var: self.api.key_env.clone(),
            })
    }

    #[allow(clippy::too_many_lines)]
    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // api
        if let Some(raw) = lookup("ARS_API_BASE_URL") {
            self.api.base_url = raw;
        }
        if let Some(raw) = lookup("ARS_API_GUI_URL") {
            self.api.gui_url = raw;
        }
        if let Some(raw) = lookup("ARS_API_KEY_ENV") {
            self.api.key_env = raw;
        }
        set_u64(&mut lookup, "ARS_API_CONNECT_TIMEOUT_SECS", &mut self.api.connect_timeout_secs)?;
        set_u64(&mut lookup, "ARS_API_LOOKUP_TIMEOUT_SECS", &mut self.api.lookup_timeout_secs)?;
        set_u64(&mut lookup, "ARS_API_UPLOAD_TIMEOUT_SECS", &mut self.api.upload_timeout_secs)?;
        set_u64(
            &mut lookup,
            "ARS_API_LARGE_UPLOAD_TIMEOUT_SECS",
            &mut self.api.large_upload_timeout_secs,
        )?;

        // transport
        if let Some(raw) = lookup("ARS_TRANSPORT_MODE") {
            self.transport.mode = parse_transport_mode(&raw)?;
        }
        if let Some(raw) = lookup("ARS_TRANSPORT_CURL_BINARY") {
            self.transport.curl_binary = raw;
        }

        // scan
        if let Some(raw) = lookup("ARS_SCAN_DIRECTORIES") {
            self.scan.directories = env::split_paths(&raw).collect();
        }
        if let Some(raw) = lookup("ARS_SCAN_EXTENSIONS") {
            self.scan.extensions = raw
                .split(',')
                .map(|ext| ext.trim().to_string())
                .filter(|ext| !ext.is_empty())
                .collect();
        }
        set_u64(&mut lookup, "ARS_SCAN_PACING_SECS", &mut self.scan.pacing_secs)?;

        // retry
        set_u64(
            &mut lookup,
            "ARS_RETRY_RATE_LIMIT_WAIT_SECS",
            &mut self.retry.rate_limit_wait_secs,
        )?;
        if let Some(raw) = lookup("ARS_RETRY_MAX_RATE_LIMIT_RETRIES") {
            self.retry.max_rate_limit_retries =
                raw.parse::<u32>().map_err(|error| ArsError::ConfigParse {
                    context: "env",
                    details: format!("ARS_RETRY_MAX_RATE_LIMIT_RETRIES={raw:?}: {error}"),
                })?;
        }

        // upload
        set_bool(&mut lookup, "ARS_UPLOAD_ENABLED", &mut self.upload.enabled)?;
        set_u64(&mut lookup, "ARS_UPLOAD_DIRECT_MAX_BYTES", &mut self.upload.direct_max_bytes)?;
        set_u64(&mut lookup, "ARS_UPLOAD_MAX_BYTES", &mut self.upload.max_bytes)?;

        // layout / lists
        if let Some(raw) = lookup("ARS_LAYOUT_BASE_DIR") {
            self.layout.base_dir = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("ARS_LISTS_ALLOW_FILE") {
            self.lists.allow_file = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("ARS_LISTS_DENY_FILE") {
            self.lists.deny_file = PathBuf::from(raw);
        }

        // logging
        set_u64(&mut lookup, "ARS_LOGGING_RETENTION_DAYS", &mut self.logging.retention_days)?;
        set_u64(&mut lookup, "ARS_LOGGING_JSONL_MAX_BYTES", &mut self.logging.jsonl_max_bytes)?;
        Ok(())
    }

    /// Make scan and layout paths absolute and strip trailing slashes.
    fn normalize_paths(&mut self) {
        for dir in &mut self.scan.directories {
            *dir = resolve_absolute_path(dir);
        }
        self.layout.base_dir = resolve_absolute_path(&self.layout.base_dir);
        for ext in &mut self.scan.extensions {
            *ext = ext.trim_start_matches('.').to_ascii_lowercase();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(ArsError::InvalidConfig {
                details: "api.base_url must not be empty".to_string(),
            });
        }
        if self.api.key_env.trim().is_empty() && self.api.key.trim().is_empty() {
            return Err(ArsError::InvalidConfig {
                details: "api.key_env must name an environment variable when api.key is empty"
                    .to_string(),
            });
        }
        for (name, val) in [
            ("api.connect_timeout_secs", self.api.connect_timeout_secs),
            ("api.lookup_timeout_secs", self.api.lookup_timeout_secs),
            ("api.upload_timeout_secs", self.api.upload_timeout_secs),
            (
                "api.large_upload_timeout_secs",
                self.api.large_upload_timeout_secs,
            ),
        ] {
            if val == 0 {
                return Err(ArsError::InvalidConfig {
                    details: format!("{name} must be > 0"),
                });
            }
        }
        if self.transport.curl_binary.trim().is_empty() {
            return Err(ArsError::InvalidConfig {
                details: "transport.curl_binary must not be empty".to_string(),
            });
        }
        if self.upload.max_bytes == 0 {
            return Err(ArsError::InvalidConfig {
                details: "upload.max_bytes must be > 0".to_string(),
            });
        }
        if self.upload.direct_max_bytes > self.upload.max_bytes {
            return Err(ArsError::InvalidConfig {
                details: format!(
                    "upload.direct_max_bytes ({}) must be <= upload.max_bytes ({})",
                    self.upload.direct_max_bytes, self.upload.max_bytes
                ),
            });
        }
        if self.logging.retention_days == 0 {
            return Err(ArsError::InvalidConfig {
                details: "logging.retention_days must be >= 1".to_string(),
            });
        }

        let names = [
            ("layout.clean_dir", &self.layout.clean_dir),
            ("layout.infected_dir", &self.layout.infected_dir),
            ("layout.too_large_dir", &self.layout.too_large_dir),
            ("layout.pending_dir", &self.layout.pending_dir),
            ("layout.reports_dir", &self.layout.reports_dir),
            ("layout.logs_dir", &self.layout.logs_dir),
        ];
        for (name, value) in names {
            if value.trim().is_empty() || value.contains(['/', '\\']) {
                return Err(ArsError::InvalidConfig {
                    details: format!("{name} must be a single non-empty directory name"),
                });
            }
        }
        for (i, (name_a, a)) in names.iter().enumerate() {
            if let Some((name_b, _)) = names[i + 1..].iter().find(|(_, b)| *b == *a) {
                return Err(ArsError::InvalidConfig {
                    details: format!("{name_a} and {name_b} must differ (both {a:?})"),
                });
            }
        }

        if self.policy.malicious_keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(ArsError::InvalidConfig {
                details: "policy.malicious_keywords must contain at least one keyword".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_transport_mode(raw: &str) -> Result<TransportMode> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "auto" => Ok(TransportMode::Auto),
        "managed" => Ok(TransportMode::Managed),
        "raw" => Ok(TransportMode::Raw),
        other => Err(ArsError::ConfigParse {
            context: "env",
            details: format!("ARS_TRANSPORT_MODE={other:?}: expected auto, managed or raw"),
        }),
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_u64<F>(lookup: &mut F, name: &str, slot: &mut u64) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = raw.parse::<u64>().map_err(|error| ArsError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_bool<F>(lookup: &mut F, name: &str, slot: &mut bool) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = raw.parse::<bool>().map_err(|error| ArsError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}
