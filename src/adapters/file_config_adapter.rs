//! INI file configuration adapter.

use crate::domain::error::EngineError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;
use std::str::FromStr;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| EngineError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, EngineError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| EngineError::ConfigParse {
                file: "<string>".into(),
                reason,
            })?;
        Ok(Self { config })
    }

    /// Trimmed value of `section.key`; blank values count as absent.
    fn lookup(&self, section: &str, key: &str) -> Option<String> {
        let raw = self.config.get(section, key)?;
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    fn lookup_parsed<T: FromStr>(&self, section: &str, key: &str) -> Option<T> {
        self.lookup(section, key)?.parse().ok()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.lookup(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.lookup_parsed(section, key).unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.lookup_parsed(section, key).unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.lookup(section, key)
            .as_deref()
            .and_then(parse_bool)
            .unwrap_or(default)
    }
}
