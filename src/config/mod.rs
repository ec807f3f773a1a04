use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Transcript database settings
    pub database: DatabaseConfig,

    /// Shared HTTP client settings for the network strategies
    pub http: HttpConfig,

    /// External-process strategy
    pub process: ProcessConfig,

    /// YouTube Data API strategies (OAuth and API key)
    pub data_api: DataApiConfig,

    /// Embedded player client strategy
    pub innertube: InnertubeConfig,

    /// Watch page scraping strategy
    pub watch_page: WatchPageConfig,

    /// Title/channel lookup
    pub metadata: MetadataConfig,

    /// Resolver behaviour
    pub resolver: ResolverConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file; defaults to the platform data directory
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout for every network strategy
    pub timeout_secs: u64,

    pub user_agent: String,

    pub accept_language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub enabled: bool,

    /// Interpreter or executable to spawn
    pub program: String,

    /// Arguments placed before the video id
    pub args: Vec<String>,

    /// Hard wall-clock limit for one run
    pub timeout_secs: u64,

    /// Preferred caption languages, passed as `--languages`
    pub languages: Vec<String>,

    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataApiConfig {
    pub base_url: String,

    /// Public timed-text endpoint used when an authorized download is refused
    pub timedtext_url: String,

    /// Non-expiring API key
    pub api_key: Option<String>,

    /// JSON file holding an OAuth2 `access_token`, maintained by an external flow
    pub oauth_token_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InnertubeConfig {
    pub base_url: String,
    pub client_name: String,
    pub client_version: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchPageConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub oembed_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Upper bound on any single strategy attempt; `None` disables the guard
    pub attempt_timeout_secs: Option<u64>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
                .to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
        }
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "python3".to_string(),
            args: vec!["scripts/transcript_fetcher.py".to_string()],
            timeout_secs: 30,
            languages: vec!["en".to_string(), "en-US".to_string()],
            working_dir: None,
        }
    }
}

impl Default for DataApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.googleapis.com/youtube/v3".to_string(),
            timedtext_url: "https://www.youtube.com/api/timedtext".to_string(),
            api_key: None,
            oauth_token_file: None,
        }
    }
}

impl Default for InnertubeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.youtube.com".to_string(),
            client_name: "WEB".to_string(),
            client_version: "2.20240726.00.00".to_string(),
            api_key: None,
        }
    }
}

impl Default for WatchPageConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.youtube.com".to_string(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            oembed_url: "https://www.youtube.com/oembed".to_string(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: Some(60),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ProcessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ResolverConfig {
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    /// Load configuration from an explicit file, the default location, or create defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = match explicit {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .context("Failed to parse config file")?;

            config.validate()?;
            Ok(config)
        } else if explicit.is_some() {
            anyhow::bail!("Config file not found: {}", config_path.display());
        } else {
            let config = Self::default();
            if let Err(e) = config.save_to(&config_path) {
                tracing::debug!("Could not write default config: {:#}", e);
            }
            Ok(config)
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("tubescript.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("tubescript").join("config.yaml"))
    }

    /// Resolved database location
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.database.path {
            return Ok(path.clone());
        }

        let data_dir = dirs::data_dir()
            .context("Could not determine data directory")?;

        Ok(data_dir.join("tubescript").join("transcripts.db"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.http.timeout_secs == 0 {
            anyhow::bail!("http.timeout_secs must be greater than zero");
        }

        if self.process.enabled {
            if self.process.program.trim().is_empty() {
                anyhow::bail!("process.program must be set when the process strategy is enabled");
            }
            if self.process.timeout_secs == 0 {
                anyhow::bail!("process.timeout_secs must be greater than zero");
            }
        }

        if self.resolver.attempt_timeout_secs == Some(0) {
            anyhow::bail!("resolver.attempt_timeout_secs must be greater than zero");
        }

        for (name, value) in [
            ("data_api.base_url", &self.data_api.base_url),
            ("data_api.timedtext_url", &self.data_api.timedtext_url),
            ("innertube.base_url", &self.innertube.base_url),
            ("watch_page.base_url", &self.watch_page.base_url),
            ("metadata.oembed_url", &self.metadata.oembed_url),
        ] {
            url::Url::parse(value).with_context(|| format!("{} is not a valid URL", name))?;
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        match self.database_path() {
            Ok(path) => println!("  Database: {}", path.display()),
            Err(_) => println!("  Database: <unresolved>"),
        }
        println!("  HTTP timeout: {}s", self.http.timeout_secs);
        if self.process.enabled {
            println!(
                "  Process strategy: {} {} (timeout {}s)",
                self.process.program,
                self.process.args.join(" "),
                self.process.timeout_secs
            );
        } else {
            println!("  Process strategy: disabled");
        }
        println!("  Data API key: {}", if self.data_api.api_key.is_some() { "set" } else { "not set" });
        if let Some(token_file) = &self.data_api.oauth_token_file {
            println!("  OAuth token file: {}", token_file.display());
        }
        match self.resolver.attempt_timeout_secs {
            Some(secs) => println!("  Attempt timeout: {}s", secs),
            None => println!("  Attempt timeout: none"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.process.timeout(), Duration::from_secs(30));
        assert_eq!(config.resolver.attempt_timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "process:\n  program: /opt/venv/bin/python\n  timeout_secs: 5\ndata_api:\n  api_key: abc\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.process.program, "/opt/venv/bin/python");
        assert_eq!(config.process.timeout_secs, 5);
        assert_eq!(config.process.languages, vec!["en", "en-US"]);
        assert_eq!(config.data_api.api_key.as_deref(), Some("abc"));
        assert_eq!(config.http.timeout_secs, 15);
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let mut config = Config::default();
        config.process.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.resolver.attempt_timeout_secs = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs_err::write(&path, "database:\n  path: /tmp/x.db\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.database_path().unwrap(), PathBuf::from("/tmp/x.db"));

        assert!(Config::load(Some(&dir.path().join("missing.yaml"))).is_err());
    }
}
