use crate::{
    checks::Checks, pacing::Pacing, profile::RampProfile, thresholds::ThresholdPolicy,
};
use anyhow::{anyhow, bail, Context};
use serde::Deserialize;
use std::{
    collections::HashSet,
    fmt,
    fs::{self, File},
    io::{Read, Write},
    str::FromStr,
};

static EXAMPLE_CONFIG: &str = include_str!("templates/rampart.toml");

/// Which variant of the target service to exercise. `sync` prefixes every
/// request path with `/sync`; `async` hits the base URL as-is.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Sync,
    #[default]
    Async,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sync" => Ok(Mode::Sync),
            "async" => Ok(Mode::Async),
            _ => Err(anyhow!("invalid mode {s}: expected 'sync' or 'async'")),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Mode::Sync => write!(f, "sync"),
            Mode::Async => write!(f, "async"),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Target {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub mode: Mode,
}

impl Default for Target {
    fn default() -> Self {
        Target {
            base_url: default_base_url(),
            mode: Mode::default(),
        }
    }
}

/// One endpoint a virtual user hits every iteration. The name tags requests
/// for metric slicing and prefixes the generated check labels.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Scenario {
    pub name: String,
    pub path: String,
    pub max_duration_ms: u64,
}

impl Scenario {
    pub fn checks(&self) -> anyhow::Result<Checks> {
        Checks::build(&self.name, self.max_duration_ms)
    }
}

fn default_min_secs() -> f64 {
    1.0
}

fn default_max_secs() -> f64 {
    3.0
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct PacingConfig {
    #[serde(default = "default_min_secs")]
    pub min_secs: f64,
    #[serde(default = "default_max_secs")]
    pub max_secs: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        PacingConfig {
            min_secs: default_min_secs(),
            max_secs: default_max_secs(),
        }
    }
}

/// Environment configuration surface. Read once at startup; the resulting
/// [`Config`] is immutable for the duration of the run.
#[derive(Debug, Default, PartialEq)]
pub struct EnvOverrides {
    pub base_url: Option<String>,
    pub mode: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> EnvOverrides {
        let non_empty = |v: Result<String, std::env::VarError>| v.ok().filter(|s| !s.is_empty());
        EnvOverrides {
            base_url: non_empty(std::env::var("BASE_URL")),
            mode: non_empty(std::env::var("MODE")),
        }
    }
}

// ******** ******** ********
// **    CONFIGURATION     **
// ******** ******** ********
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub target: Target,
    pub profile: RampProfile,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub thresholds: ThresholdPolicy,
    #[serde(rename(serialize = "scenario", deserialize = "scenario"))]
    pub scenarios: Vec<Scenario>,
    pub debug_level: Option<String>,
}

impl Config {
    pub fn try_from_path(path: &std::path::Path) -> anyhow::Result<Config> {
        let mut config_str = String::new();
        fs::File::open(path)
            .context(format!("Unable to open config file {}", path.display()))?
            .read_to_string(&mut config_str)?;
        Config::try_from_str(&config_str)
    }

    pub fn try_from_str(conf_str: &str) -> anyhow::Result<Config> {
        toml::from_str::<Config>(conf_str).map_err(|e| anyhow!("TOML parsing error: {}", e))
    }

    /// Loads, overrides and validates the run configuration in one step:
    /// config file < environment (`BASE_URL`, `MODE`) < CLI flags.
    /// Any malformed input is fatal here, before the run begins.
    pub fn load(
        path: &std::path::Path,
        mode_flag: Option<&str>,
        base_url_flag: Option<&str>,
    ) -> anyhow::Result<Config> {
        let mut config = Config::try_from_path(path)?;
        config.apply_env(&EnvOverrides::from_env())?;

        if let Some(mode) = mode_flag {
            config.target.mode = mode.parse()?;
        }
        if let Some(base_url) = base_url_flag {
            config.target.base_url = base_url.to_string();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self, env: &EnvOverrides) -> anyhow::Result<()> {
        if let Some(base_url) = &env.base_url {
            self.target.base_url = base_url.clone();
        }
        if let Some(mode) = &env.mode {
            self.target.mode = mode.parse().context("invalid MODE environment variable")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.profile.validate()?;
        self.thresholds.validate()?;
        self.pacing()?;

        if self.scenarios.is_empty() {
            bail!("config must declare at least one scenario");
        }
        let mut names = HashSet::new();
        for scenario in &self.scenarios {
            scenario.checks()?;
            if !names.insert(scenario.name.as_str()) {
                bail!("duplicate scenario name: {}", scenario.name);
            }
            if !scenario.path.starts_with('/') {
                bail!(
                    "scenario {} path must start with '/', got {}",
                    scenario.name,
                    scenario.path
                );
            }
        }
        Ok(())
    }

    pub fn pacing(&self) -> anyhow::Result<Pacing> {
        Pacing::new(self.pacing.min_secs, self.pacing.max_secs)
    }

    /// Base URL with the mode path applied, no trailing slash.
    pub fn effective_base_url(&self) -> String {
        let base = self.target.base_url.trim_end_matches('/');
        match self.target.mode {
            Mode::Sync => format!("{base}/sync"),
            Mode::Async => base.to_string(),
        }
    }

    pub fn url_for(&self, scenario: &Scenario) -> String {
        format!("{}{}", self.effective_base_url(), scenario.path)
    }

    pub fn write_example_to_file(path: &std::path::Path) -> anyhow::Result<File> {
        let mut file = File::create_new(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => {
                anyhow!("{} already exists, not overwriting", path.display())
            }
            _ => anyhow::Error::new(e).context(format!("failed to create {}", path.display())),
        })?;
        File::write_all(&mut file, EXAMPLE_CONFIG.as_bytes())?;
        Ok(file)
    }
}
