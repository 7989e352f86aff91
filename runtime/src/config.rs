//! Shell configuration
//!
//! Loaded from TOML; every section and field falls back to its default, so a
//! partial file only overrides what it names. At runtime the `settings`
//! command reads and writes fields by dotted key (`pipe.capacity`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShellError};

/// Shell configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ShellConfig {
    #[serde(default)]
    pub debug: DebugConfig,

    #[serde(default)]
    pub pipe: PipeConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub output: OutputConfig,

    /// User command aliases, name to canonical command.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebugConfig {
    /// Logger filter, e.g. `"pipe=debug,*=warn"`.
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "*=warn".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipeConfig {
    /// Items buffered per pipe before the producer suspends.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

fn default_capacity() -> usize {
    crate::io::DEFAULT_CAPACITY
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryConfig {
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    /// File backing the history; in-memory when unset.
    #[serde(default)]
    pub path: Option<String>,

    /// Commands never recorded.
    #[serde(default = "default_skip")]
    pub skip: Vec<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            path: None,
            skip: default_skip(),
        }
    }
}

fn default_max_size() -> usize {
    100
}

fn default_skip() -> Vec<String> {
    ["exit", "help", "clear", "_", "alias", "history", "hist"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Output lines kept per command for history.
    #[serde(default = "default_max_buffer")]
    pub max_buffer: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_buffer: default_max_buffer(),
        }
    }
}

fn default_max_buffer() -> usize {
    1024
}

impl ShellConfig {
    /// Load config from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| ShellError::Config(e.to_string()))
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Option<String> {
        toml::to_string_pretty(self).ok()
    }

    fn to_value(&self) -> Result<toml::Value> {
        toml::Value::try_from(self).map_err(|e| ShellError::Config(e.to_string()))
    }

    /// Every setting as `(section.key, value)`, sorted by key. Aliases are
    /// listed by the `alias` command instead.
    pub fn entries(&self) -> Result<Vec<(String, toml::Value)>> {
        let mut entries = Vec::new();
        if let toml::Value::Table(sections) = self.to_value()? {
            for (section, fields) in sections {
                if section == "aliases" {
                    continue;
                }
                match fields {
                    toml::Value::Table(fields) => entries.extend(
                        fields
                            .into_iter()
                            .map(|(key, value)| (format!("{}.{}", section, key), value)),
                    ),
                    value => entries.push((section, value)),
                }
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    /// Value of one dotted key, `None` if there is no such setting.
    pub fn get(&self, key: &str) -> Result<Option<toml::Value>> {
        let mut value = self.to_value()?;
        for part in key.split('.') {
            match value {
                toml::Value::Table(mut table) => match table.remove(part) {
                    Some(next) => value = next,
                    None => return Ok(None),
                },
                _ => return Ok(None),
            }
        }
        Ok(Some(value))
    }

    /// Set one dotted key from its text form. `raw` is read as a TOML value
    /// when it is one (`8`, `true`, `["a", "b"]`) and as a string otherwise.
    /// Nothing changes unless the result is a valid config.
    pub fn set(&mut self, key: &str, raw: &str) -> Result<toml::Value> {
        let Some((section, field)) = key.split_once('.') else {
            return Err(ShellError::InvalidArgument(format!("unknown setting: {}", key)));
        };
        let mut root = self.to_value()?;
        let Some(fields) = root
            .as_table_mut()
            .and_then(|sections| sections.get_mut(section))
            .and_then(toml::Value::as_table_mut)
        else {
            return Err(ShellError::InvalidArgument(format!("unknown setting: {}", key)));
        };
        let value = parse_setting(raw);
        fields.insert(field.to_string(), value);

        let updated = root
            .try_into::<ShellConfig>()
            .map_err(|e| ShellError::Config(format!("{}: {}", key, e.message())))?;
        // Unknown fields are dropped on the way back in.
        let Some(stored) = updated.get(key)? else {
            return Err(ShellError::InvalidArgument(format!("unknown setting: {}", key)));
        };
        *self = updated;
        Ok(stored)
    }
}

fn parse_setting(raw: &str) -> toml::Value {
    let raw = raw.trim();
    toml::from_str::<toml::Table>(&format!("v = {}", raw))
        .ok()
        .and_then(|mut table| table.remove("v"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ShellConfig::default();
        assert_eq!(config.history.max_size, 100);
        assert_eq!(config.output.max_buffer, 1024);
        assert_eq!(config.pipe.capacity, crate::io::DEFAULT_CAPACITY);
        assert!(config.history.skip.contains(&"help".to_string()));
    }

    #[test]
    fn test_partial_override() {
        let config = ShellConfig::from_toml(
            r#"
            [history]
            max_size = 5

            [debug]
            filter = "pipe=debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.history.max_size, 5);
        assert_eq!(config.history.skip, default_skip());
        assert_eq!(config.debug.filter, "pipe=debug");
        assert_eq!(config.output, OutputConfig::default());
    }

    #[test]
    fn test_malformed() {
        let err = ShellConfig::from_toml("[history\nmax_size = ").unwrap_err();
        assert!(matches!(err, ShellError::Config(_)));
    }

    #[test]
    fn test_aliases_section() {
        let config = ShellConfig::from_toml("[aliases]\nll = \"len\"\n").unwrap();
        assert_eq!(config.aliases.get("ll").map(String::as_str), Some("len"));
        assert_eq!(ShellConfig::from_toml(&config.to_toml().unwrap()).unwrap(), config);
    }

    #[test]
    fn test_entries_are_dotted_and_sorted() {
        let entries = ShellConfig::default().entries().unwrap();
        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"pipe.capacity"));
        assert!(keys.contains(&"debug.filter"));
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        // unset optional fields have no entry
        assert!(!keys.contains(&"history.path"));
    }

    #[test]
    fn test_get_and_set() {
        let mut config = ShellConfig::default();
        assert_eq!(
            config.get("output.max_buffer").unwrap(),
            Some(toml::Value::Integer(1024))
        );
        assert_eq!(config.get("output.nope").unwrap(), None);

        config.set("pipe.capacity", "8").unwrap();
        assert_eq!(config.pipe.capacity, 8);
        config.set("debug.filter", "pipe=debug").unwrap();
        assert_eq!(config.debug.filter, "pipe=debug");
        config.set("history.skip", r#"["exit"]"#).unwrap();
        assert_eq!(config.history.skip, vec!["exit"]);
        config.set("history.path", "/tmp/h.json").unwrap();
        assert_eq!(config.history.path.as_deref(), Some("/tmp/h.json"));
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut config = ShellConfig::default();
        let err = config.set("pipe.capacity", "lots").unwrap_err();
        assert!(matches!(err, ShellError::Config(_)));
        assert!(matches!(
            config.set("pipe.colour", "red").unwrap_err(),
            ShellError::InvalidArgument(_)
        ));
        assert!(config.set("nosection.x", "1").is_err());
        assert!(config.set("capacity", "1").is_err());
        assert_eq!(config, ShellConfig::default());
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = ShellConfig::default();
        let text = config.to_toml().unwrap();
        assert_eq!(ShellConfig::from_toml(&text).unwrap(), config);
    }
}
