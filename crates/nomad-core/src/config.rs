//! Process-wide defaults, threaded explicitly instead of read from module
//! globals (see the Design Notes: "Global state → config value").

use std::collections::HashSet;
use std::path::PathBuf;

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
}

fn env_set(key: &str, default: &[&str]) -> HashSet<String> {
    match std::env::var(key) {
        Ok(v) => v.split(',').map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()).collect(),
        Err(_) => default.iter().map(|s| s.to_string()).collect(),
    }
}

/// Default allowed country codes, matching the upstream column analyser's
/// `ALLOWED_COUNTRY_CODES` default.
pub const DEFAULT_COUNTRY_CODES: &[&str] = &["ru", "kg", "uz", "tm", "ua", "by", "nl", "az"];

/// Number of leading rows sampled for CSV schema inference when no
/// override is given.
pub const DEFAULT_ANALYZE_ROWS: usize = 1000;

/// The streaming row-group width the sink targets, and the unit of
/// progress reporting.
pub const DEFAULT_CHUNK_SIZE: usize = 50_000;

/// Soft/hard memory-pressure thresholds as a fraction of total RAM.
pub const DEFAULT_SOFT_MEMORY_THRESHOLD: f64 = 0.80;
pub const DEFAULT_HARD_MEMORY_THRESHOLD: f64 = 0.90;

/// Config record threaded from `main` through the engine driver, replacing
/// the upstream's module-level environment globals.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_folder: PathBuf,
    pub input_folder: PathBuf,
    pub log_folder: PathBuf,
    pub parquet_folder: PathBuf,
    pub exports_folder: PathBuf,
    pub analyze_cache_folder: PathBuf,
    pub allowed_country_codes: HashSet<String>,
    pub analyze_rows: usize,
    pub chunk_size: usize,
    pub soft_memory_threshold: f64,
    pub hard_memory_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_folder: env_path("BASE_FOLDER", "."),
            input_folder: env_path("INPUT_FOLDER", "data"),
            log_folder: env_path("LOG_FOLDER", "logs"),
            parquet_folder: env_path("PARQUET_FOLDER", "parquet_cache"),
            exports_folder: env_path("EXPORTS_FOLDER", "exports"),
            analyze_cache_folder: env_path("ANALYZE_CACHE_FOLDER", "analyze_cache"),
            allowed_country_codes: env_set("ALLOWED_COUNTRY_CODES", DEFAULT_COUNTRY_CODES),
            analyze_rows: std::env::var("ANALYZE_ROWS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_ANALYZE_ROWS),
            chunk_size: DEFAULT_CHUNK_SIZE,
            soft_memory_threshold: DEFAULT_SOFT_MEMORY_THRESHOLD,
            hard_memory_threshold: DEFAULT_HARD_MEMORY_THRESHOLD,
        }
    }
}

impl Config {
    pub fn is_country_allowed(&self, cc: &str) -> bool {
        self.allowed_country_codes.contains(&cc.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_country_codes_match_upstream() {
        let cfg = Config::default();
        for cc in DEFAULT_COUNTRY_CODES {
            assert!(cfg.is_country_allowed(cc));
        }
        assert!(!cfg.is_country_allowed("zz"));
    }

    #[test]
    fn country_check_is_case_insensitive() {
        let cfg = Config::default();
        assert!(cfg.is_country_allowed("RU"));
    }
}
