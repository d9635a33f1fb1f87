// Benchmark Configuration
// Loaded once at startup and passed by reference into every component.

use crate::types::{Candidate, CandidateId, LoadTestSettings};
use crate::validation::validate_config;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "benchmark-config.json";

/// Immutable run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchConfig {
    #[serde(alias = "candidates")]
    pub frameworks: Vec<CandidateSpec>,
    #[serde(default = "default_apps_dir")]
    pub apps_dir: PathBuf,
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    pub health_endpoint: String,
    pub test_endpoint: String,
    #[serde(default)]
    pub load_test: LoadTestSettings,
    #[serde(default)]
    pub build_benchmark: HarnessSettings,
    #[serde(default)]
    pub cold_start_benchmark: HarnessSettings,
    #[serde(default)]
    pub health: HealthSettings,
    #[serde(default)]
    pub sampler: SamplerSettings,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    #[serde(default = "default_readme")]
    pub readme: PathBuf,
    #[serde(default, alias = "runtimeLabel")]
    pub node_version: Option<String>,
    #[serde(default = "default_tools")]
    pub tools: Vec<ToolSpec>,
}

/// A candidate entry: either a bare identifier or a detailed object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CandidateSpec {
    Name(String),
    Detailed {
        id: String,
        #[serde(default)]
        root: Option<PathBuf>,
        #[serde(default)]
        start: Option<String>,
        #[serde(default)]
        build: Option<String>,
        #[serde(default, rename = "buildOutput")]
        build_output: Option<PathBuf>,
    },
}

impl CandidateSpec {
    pub fn id(&self) -> &str {
        match self {
            CandidateSpec::Name(id) => id,
            CandidateSpec::Detailed { id, .. } => id,
        }
    }
}

/// Warmup and measured run counts for the external statistical harness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessSettings {
    pub warmup: u32,
    pub runs: u32,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self { warmup: 1, runs: 5 }
    }
}

/// Readiness polling used before each load test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HealthSettings {
    pub max_attempts: u32,
    pub interval_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval_ms: 1000,
            request_timeout_ms: 1000,
        }
    }
}

impl HealthSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// How the resource sampler runs during a load test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplerMode {
    /// Separate `servbench monitor` process, stopped with SIGINT
    #[default]
    Process,
    /// Task inside the orchestrator, stopped with a cancellation token
    Task,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SamplerSettings {
    pub cadence_ms: u64,
    /// Pause between starting the sampler and starting the load
    pub warmup_ms: u64,
    pub mode: SamplerMode,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            cadence_ms: 100,
            warmup_ms: 1000,
            mode: SamplerMode::Process,
        }
    }
}

impl SamplerSettings {
    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.cadence_ms)
    }
}

/// External tool checked by the toolchain verifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    #[serde(default = "default_version_args")]
    pub version_args: Vec<String>,
    #[serde(default)]
    pub required: bool,
    /// Shell command that installs the tool when it is optional and missing
    #[serde(default)]
    pub install: Option<String>,
    /// Shown to the user when a required tool is missing
    #[serde(default)]
    pub install_hint: Option<String>,
}

impl ToolSpec {
    pub fn required(name: &str, install_hint: &str) -> Self {
        Self {
            name: name.to_string(),
            version_args: default_version_args(),
            required: true,
            install: None,
            install_hint: Some(install_hint.to_string()),
        }
    }

    pub fn optional(name: &str, install: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            version_args: default_version_args(),
            required: false,
            install: install.map(str::to_string),
            install_hint: install.map(str::to_string),
        }
    }
}

fn default_apps_dir() -> PathBuf {
    PathBuf::from("apps")
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_cooldown_ms() -> u64 {
    1000
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_readme() -> PathBuf {
    PathBuf::from("README.md")
}

fn default_version_args() -> Vec<String> {
    vec!["--version".to_string()]
}

pub fn default_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::required(
            "hyperfine",
            "brew install hyperfine (macOS) or cargo install hyperfine (Linux)",
        ),
        ToolSpec::optional("autocannon", Some("npm install -g autocannon")),
        ToolSpec::optional("pnpm", Some("npm install -g pnpm")),
    ]
}

impl BenchConfig {
    /// Load and validate a configuration file.
    ///
    /// The format is chosen by extension: `.toml`, `.yaml`/`.yml`, anything
    /// else is parsed as JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        let config: BenchConfig = match extension.as_deref() {
            Some("toml") => toml::from_str(&raw)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&raw)
                .with_context(|| format!("Invalid YAML in {}", path.display()))?,
            _ => serde_json::from_str(&raw)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?,
        };

        validate_config(&config)?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: BenchConfig = serde_json::from_str(raw).context("Invalid JSON config")?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Resolve candidate specs into full candidates, in configuration order
    pub fn candidates(&self) -> Vec<Candidate> {
        self.frameworks
            .iter()
            .map(|spec| match spec {
                CandidateSpec::Name(id) => Candidate {
                    id: CandidateId::new(id.as_str()),
                    start_command: "pnpm start".to_string(),
                    build_command: "pnpm build".to_string(),
                    root: self.apps_dir.join(id),
                    build_output: PathBuf::from("dist"),
                },
                CandidateSpec::Detailed {
                    id,
                    root,
                    start,
                    build,
                    build_output,
                } => Candidate {
                    id: CandidateId::new(id.as_str()),
                    start_command: start.clone().unwrap_or_else(|| "pnpm start".to_string()),
                    build_command: build.clone().unwrap_or_else(|| "pnpm build".to_string()),
                    root: root.clone().unwrap_or_else(|| self.apps_dir.join(id)),
                    build_output: build_output.clone().unwrap_or_else(|| PathBuf::from("dist")),
                },
            })
            .collect()
    }

    pub fn candidate(&self, id: &str) -> Option<Candidate> {
        self.candidates().into_iter().find(|c| c.id.as_str() == id)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn health_url(&self) -> String {
        format!("{}{}", self.base_url(), self.health_endpoint)
    }

    pub fn test_url(&self) -> String {
        format!("{}{}", self.base_url(), self.test_endpoint)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn latest_report_path(&self) -> PathBuf {
        self.results_dir.join("latest.json")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.results_dir.join("summary.md")
    }
}
