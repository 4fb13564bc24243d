//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default admin password used when none is configured.
pub const DEFAULT_ADMIN_PASSWORD: &str = "meshtastic";

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Maximum accepted request body (uploaded userPrefs files, multipart forms).
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_max_upload_bytes() -> usize {
    2 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Filesystem locations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root for per-request working/output directories.
    #[serde(default = "default_temp_root")]
    pub temp_root: PathBuf,
    /// Firmware source checkout (the PlatformIO project).
    #[serde(default = "default_firmware_dir")]
    pub firmware_dir: PathBuf,
    /// Version tracking file written by the source updater.
    #[serde(default = "default_version_file")]
    pub version_file: PathBuf,
}

fn default_temp_root() -> PathBuf {
    std::env::temp_dir().join("meshtastic_config")
}

fn default_firmware_dir() -> PathBuf {
    PathBuf::from("./firmware")
}

fn default_version_file() -> PathBuf {
    PathBuf::from("./firmware_version.txt")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            temp_root: default_temp_root(),
            firmware_dir: default_firmware_dir(),
            version_file: default_version_file(),
        }
    }
}

/// Build orchestration settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildConfig {
    /// PlatformIO executable.
    #[serde(default = "default_pio_command")]
    pub pio_command: String,
    /// Ceiling for `--jobs` (actual value is min(CPUs, max_jobs)).
    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,
    /// Hard timeout for the dependency install step.
    #[serde(default = "default_dependency_timeout_secs")]
    pub dependency_timeout_secs: u64,
    /// Optional upper bound for the compile step (None = unbounded).
    #[serde(default)]
    pub compile_timeout_secs: Option<u64>,
    /// Object file count above which the build cache is reported as warm.
    #[serde(default = "default_warm_object_threshold")]
    pub warm_object_threshold: usize,
    /// Candidate RAM-backed scratch roots, first writable one wins.
    #[serde(default = "default_scratch_roots")]
    pub scratch_roots: Vec<PathBuf>,
    /// Engage ccache when it is on PATH.
    #[serde(default = "default_use_ccache")]
    pub use_ccache: bool,
    /// Locations (relative to the firmware dir) the build probes for userPrefs.jsonc.
    #[serde(default = "default_staging_paths")]
    pub staging_paths: Vec<PathBuf>,
}

fn default_pio_command() -> String {
    "pio".to_string()
}

fn default_max_jobs() -> usize {
    12
}

fn default_dependency_timeout_secs() -> u64 {
    120
}

fn default_warm_object_threshold() -> usize {
    10
}

fn default_scratch_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("/dev/shm"), PathBuf::from("/tmp")]
}

fn default_use_ccache() -> bool {
    true
}

fn default_staging_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("configs").join(crate::PREFS_FILE_NAME),
        PathBuf::from(crate::PREFS_FILE_NAME),
    ]
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            pio_command: default_pio_command(),
            max_jobs: default_max_jobs(),
            dependency_timeout_secs: default_dependency_timeout_secs(),
            compile_timeout_secs: None,
            warm_object_threshold: default_warm_object_threshold(),
            scratch_roots: default_scratch_roots(),
            use_ccache: default_use_ccache(),
            staging_paths: default_staging_paths(),
        }
    }
}

impl BuildConfig {
    /// Dependency install timeout as a Duration.
    pub fn dependency_timeout(&self) -> Duration {
        Duration::from_secs(self.dependency_timeout_secs)
    }

    /// Compile timeout, if one is configured.
    pub fn compile_timeout(&self) -> Option<Duration> {
        self.compile_timeout_secs.map(Duration::from_secs)
    }

    /// Job count for the compiler: min(available CPUs, max_jobs), at least 1.
    pub fn jobs(&self) -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        cpus.min(self.max_jobs).max(1)
    }

    /// Validate build configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_jobs == 0 {
            return Err("build.max_jobs must be at least 1".to_string());
        }
        if self.dependency_timeout_secs == 0 {
            return Err("build.dependency_timeout_secs cannot be 0".to_string());
        }
        if self.staging_paths.is_empty() {
            return Err("build.staging_paths must name at least one location".to_string());
        }
        for path in &self.staging_paths {
            if path.is_absolute()
                || path
                    .components()
                    .any(|c| !matches!(c, std::path::Component::Normal(_)))
            {
                return Err(format!(
                    "build.staging_paths entry {} must be a plain relative path",
                    path.display()
                ));
            }
        }
        Ok(())
    }
}

/// Retention and cleanup settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Request directories older than this are removed by the sweep.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
    /// Interval between periodic sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Delay between a download response and removal of its directory.
    #[serde(default = "default_download_grace_secs")]
    pub download_grace_secs: u64,
}

fn default_max_age_secs() -> u64 {
    3600 // 1 hour
}

fn default_sweep_interval_secs() -> u64 {
    1800 // 30 minutes
}

fn default_download_grace_secs() -> u64 {
    5
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_max_age_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            download_grace_secs: default_download_grace_secs(),
        }
    }
}

impl RetentionConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn download_grace(&self) -> Duration {
        Duration::from_secs(self.download_grace_secs)
    }

    /// Validate retention settings.
    pub fn validate(&self) -> Result<(), String> {
        // A zero period would make the sweep loop spin.
        if self.sweep_interval_secs == 0 {
            return Err("retention.sweep_interval_secs cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Admin credential configuration.
///
/// Privileged operations (cleanup, firmware source update) require the admin
/// key. When `password_hash` is set it takes precedence over `password`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Plain admin password (falls back to "meshtastic").
    #[serde(default = "default_admin_password")]
    pub password: String,
    /// SHA256 hex of the admin password, optionally prefixed with "sha256:".
    #[serde(default)]
    pub password_hash: Option<String>,
}

fn default_admin_password() -> String {
    DEFAULT_ADMIN_PASSWORD.to_string()
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            password: default_admin_password(),
            password_hash: None,
        }
    }
}

impl AdminConfig {
    /// Whether the fallback default password is in effect.
    pub fn uses_default_password(&self) -> bool {
        self.password_hash.is_none() && self.password == DEFAULT_ADMIN_PASSWORD
    }

    /// Validate the admin hash format.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(hash) = &self.password_hash {
            let hash = hash.strip_prefix("sha256:").unwrap_or(hash);
            if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err("admin.password_hash must be 64 hex chars".to_string());
            }
        }
        Ok(())
    }
}

/// Firmware source update settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// GitHub API endpoint for the latest release.
    #[serde(default = "default_release_api_url")]
    pub release_api_url: String,
    /// Git repository cloned at the release tag.
    #[serde(default = "default_repository_url")]
    pub repository_url: String,
    /// Timeout for the release API request.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_release_api_url() -> String {
    "https://api.github.com/repos/meshtastic/firmware/releases/latest".to_string()
}

fn default_repository_url() -> String {
    "https://github.com/meshtastic/firmware".to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            release_api_url: default_release_api_url(),
            repository_url: default_repository_url(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub update: UpdateConfig,
}

impl AppConfig {
    /// Create a test configuration rooted in `root`.
    ///
    /// **For testing only.** No scratch roots, no ccache, and the default
    /// admin password.
    pub fn for_testing(root: &std::path::Path) -> Self {
        Self {
            server: ServerConfig::default(),
            paths: PathsConfig {
                temp_root: root.join("requests"),
                firmware_dir: root.join("firmware"),
                version_file: root.join("firmware_version.txt"),
            },
            build: BuildConfig {
                scratch_roots: Vec::new(),
                use_ccache: false,
                ..Default::default()
            },
            retention: RetentionConfig::default(),
            admin: AdminConfig::default(),
            update: UpdateConfig::default(),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.build.validate()?;
        self.retention.validate()?;
        self.admin.validate()?;
        Ok(())
    }
}
