use std::path::PathBuf;
use std::{env, io};

use serde::Serialize;
use tracing::debug;

use crate::errors::{AppError, AppResult};

const DEFAULT_JOURNAL_MAX_BYTES: u64 = 5 * 1024 * 1024;
const DEFAULT_JOURNAL_MAX_FILES: usize = 5;
const DEFAULT_INPUTS: &str = "output_all.json=studapart,data_paris.json=lacartedescolocs";

/// One scraper output file and the source tag its listings belong to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InputSpec {
    pub path: PathBuf,
    pub source: String,
}

impl InputSpec {
    pub fn new(path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Parses `PATH=SOURCE`.
    pub fn parse(value: &str) -> AppResult<Self> {
        let (path, source) = value
            .split_once('=')
            .ok_or_else(|| AppError::Config(format!("input `{value}` must be PATH=SOURCE")))?;
        let (path, source) = (path.trim(), source.trim());
        if path.is_empty() || source.is_empty() {
            return Err(AppError::Config(format!(
                "input `{value}` has an empty path or source"
            )));
        }
        Ok(Self::new(path, source))
    }

    pub fn parse_list(value: &str) -> AppResult<Vec<Self>> {
        value
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(Self::parse)
            .collect()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PipelineConfig {
    pub database_path: PathBuf,
    pub merged_path: PathBuf,
    pub inputs: Vec<InputSpec>,
    pub reference_table_path: Option<PathBuf>,
    pub journal_enabled: bool,
    pub journal_dir: PathBuf,
    pub journal_batch_size: usize,
    pub journal_max_bytes: u64,
    pub journal_max_files: usize,
}

impl PipelineConfig {
    pub fn from_env() -> AppResult<Self> {
        load_dotenv_if_applicable();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let lookup = &lookup;
        let inputs = lookup("RENTALS_INPUTS").unwrap_or_else(|| DEFAULT_INPUTS.to_string());
        Ok(Self {
            database_path: parse_path(lookup, "RENTALS_DATABASE_PATH", "paris_rentals.db"),
            merged_path: parse_path(lookup, "RENTALS_MERGED_PATH", "merged_rentals.json"),
            inputs: InputSpec::parse_list(&inputs)?,
            reference_table_path: lookup("RENTALS_REFERENCE_TABLE")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            journal_enabled: parse_bool(lookup, "RENTALS_JOURNAL_ENABLED", true),
            journal_dir: parse_path(lookup, "RENTALS_JOURNAL_DIR", "."),
            journal_batch_size: parse_usize(lookup, "RENTALS_JOURNAL_BATCH_SIZE", 25).max(1),
            journal_max_bytes: parse_u64(
                lookup,
                "RENTALS_JOURNAL_MAX_BYTES",
                DEFAULT_JOURNAL_MAX_BYTES,
            ),
            journal_max_files: parse_usize(
                lookup,
                "RENTALS_JOURNAL_MAX_FILES",
                DEFAULT_JOURNAL_MAX_FILES,
            )
            .max(1),
        })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("paris_rentals.db"),
            merged_path: PathBuf::from("merged_rentals.json"),
            inputs: Vec::new(),
            reference_table_path: None,
            journal_enabled: false,
            journal_dir: PathBuf::from("."),
            journal_batch_size: 25,
            journal_max_bytes: DEFAULT_JOURNAL_MAX_BYTES,
            journal_max_files: DEFAULT_JOURNAL_MAX_FILES,
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    let lookup = |key: &str| env::var(key).ok();
    cfg!(debug_assertions) || parse_bool(&lookup, "ALLOW_DOTENV", false)
}

fn parse_path(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: &str) -> PathBuf {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

fn parse_bool(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    lookup(key)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
    lookup(key)
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}
