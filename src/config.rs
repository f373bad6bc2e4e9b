use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

pub const DEFAULT_BASE_URL: &str = "https://pmc.ncbi.nlm.nih.gov";
pub const DEFAULT_AI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_AI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_USER_AGENT: &str =
    "PMC-Harvester/0.1 (+https://github.com/pmc-harvester; polite bulk article fetcher)";

const CONFIG_FILE: &str = "harvester.toml";
const ENV_PREFIX: &str = "PMC_HARVEST";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AiMode {
    /// Use the AI service when an API key is available.
    Auto,
    /// Heuristics only.
    Off,
}

/// Settings for one harvesting run. Defaults < `harvester.toml` < `PMC_HARVEST_*` env < CLI.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub out_dir: PathBuf,
    pub concurrency: usize,
    pub limit: Option<usize>,
    pub force: bool,

    pub base_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub politeness_delay_ms: u64,

    pub ai_mode: AiMode,
    pub ai_model: String,
    pub ai_base_url: String,
    pub ai_api_key: Option<String>,
    pub ai_timeout_secs: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("data"),
            concurrency: 6,
            limit: None,
            force: false,
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: 30,
            max_retries: 5,
            backoff_base_ms: 500,
            politeness_delay_ms: 400,
            ai_mode: AiMode::Auto,
            ai_model: DEFAULT_AI_MODEL.to_string(),
            ai_base_url: DEFAULT_AI_BASE_URL.to_string(),
            ai_api_key: None,
            ai_timeout_secs: 60,
        }
    }
}

impl HarvestConfig {
    /// Layer the optional config file and environment over the defaults.
    pub fn load(explicit_file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        builder = match explicit_file {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(CONFIG_FILE).required(false)),
        };
        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("failed to read harvester configuration")?;

        let mut cfg: HarvestConfig = settings
            .try_deserialize()
            .context("invalid harvester configuration")?;
        cfg.fill_ai_from_env();
        Ok(cfg)
    }

    /// `OPENAI_API_KEY` / `OPENAI_BASE_URL` apply unless set explicitly.
    fn fill_ai_from_env(&mut self) {
        if self.ai_api_key.is_none() {
            self.ai_api_key = std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty());
        }
        if self.ai_base_url == DEFAULT_AI_BASE_URL {
            if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
                if !url.trim().is_empty() {
                    self.ai_base_url = url;
                }
            }
        }
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.out_dir.join("raw")
    }

    pub fn papers_dir(&self) -> PathBuf {
        self.out_dir.join("papers")
    }

    pub fn report_path(&self) -> PathBuf {
        self.out_dir.join("run_report.json")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay_ms)
    }

    /// Why the AI path is off for this run, if it is.
    pub fn ai_disabled_reason(&self) -> Option<&'static str> {
        match (self.ai_mode, &self.ai_api_key) {
            (AiMode::Off, _) => Some("AI augmentation switched off; using heuristics"),
            (AiMode::Auto, None) => Some("OPENAI_API_KEY not set; falling back to heuristics"),
            (AiMode::Auto, Some(_)) => None,
        }
    }
}
