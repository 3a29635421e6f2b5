use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    runtime: RuntimeConfig,
    #[serde(default)]
    steps: StepsConfig,
    #[serde(default)]
    display: DisplayConfig,
    #[serde(default)]
    ini: IniConfig,
}

#[derive(Deserialize, Default)]
struct RuntimeConfig {
    latch_time_ms: Option<u64>,
    hold_delay_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    resource_path: Option<String>,
}

#[derive(Deserialize, Default)]
struct StepsConfig {
    min_param_steps: Option<usize>,
    max_param_steps: Option<usize>,
    base_tick_counts: Option<BTreeMap<String, u32>>,
}

#[derive(Deserialize, Default)]
struct DisplayConfig {
    surface_in_display: Option<bool>,
    surface_out_display: Option<bool>,
}

#[derive(Deserialize, Default)]
struct IniConfig {
    version_token: Option<String>,
}

pub struct Config {
    runtime: RuntimeConfig,
    steps: StepsConfig,
    display: DisplayConfig,
    ini: IniConfig,
}

impl Config {
    pub fn load() -> Self {
        let mut base: ConfigFile =
            toml::from_str(DEFAULT_CONFIG).expect("Failed to parse embedded config.toml");

        if let Some(path) = user_config_path() {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => base.merge(user),
                        Err(e) => {
                            log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        Config::from_file(base)
    }

    /// Embedded defaults only; used by tests and tools that must not read the user file.
    pub fn embedded() -> Self {
        let base: ConfigFile =
            toml::from_str(DEFAULT_CONFIG).expect("Failed to parse embedded config.toml");
        Config::from_file(base)
    }

    /// Embedded defaults overridden by a TOML string.
    pub fn with_overrides(contents: &str) -> Result<Self, toml::de::Error> {
        let mut base: ConfigFile =
            toml::from_str(DEFAULT_CONFIG).expect("Failed to parse embedded config.toml");
        base.merge(toml::from_str(contents)?);
        Ok(Config::from_file(base))
    }

    fn from_file(file: ConfigFile) -> Self {
        Config {
            runtime: file.runtime,
            steps: file.steps,
            display: file.display,
            ini: file.ini,
        }
    }

    pub fn latch_time_ms(&self) -> f64 {
        self.runtime.latch_time_ms.unwrap_or(100) as f64
    }

    pub fn hold_delay_ms(&self) -> f64 {
        self.runtime.hold_delay_ms.unwrap_or(1000).max(1) as f64
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.runtime.poll_interval_ms.unwrap_or(15).clamp(1, 1000)
    }

    /// Configured resource root, `None` when the DAW's resource path should be used.
    pub fn resource_path(&self) -> Option<PathBuf> {
        self.runtime
            .resource_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }

    pub fn min_param_steps(&self) -> usize {
        self.steps.min_param_steps.unwrap_or(2).max(2)
    }

    pub fn max_param_steps(&self) -> usize {
        self.steps
            .max_param_steps
            .unwrap_or(30)
            .max(self.min_param_steps())
    }

    /// Encoder ticks per step for a stepped parameter with `step_count` values.
    /// Counts missing from the table use the closest smaller entry, else 1.
    pub fn base_tick_count(&self, step_count: usize) -> u32 {
        let Some(table) = self.steps.base_tick_counts.as_ref() else {
            return 1;
        };
        table
            .iter()
            .filter_map(|(k, v)| k.parse::<usize>().ok().map(|k| (k, *v)))
            .filter(|(k, _)| *k <= step_count)
            .max_by_key(|(k, _)| *k)
            .map(|(_, v)| v)
            .unwrap_or(1)
    }

    pub fn surface_in_display(&self) -> bool {
        self.display.surface_in_display.unwrap_or(false)
    }

    pub fn surface_out_display(&self) -> bool {
        self.display.surface_out_display.unwrap_or(false)
    }

    pub fn version_token(&self) -> &str {
        self.ini.version_token.as_deref().unwrap_or("Version 3.0")
    }
}

impl ConfigFile {
    fn merge(&mut self, user: ConfigFile) {
        merge_runtime(&mut self.runtime, user.runtime);
        merge_steps(&mut self.steps, user.steps);
        merge_display(&mut self.display, user.display);
        if user.ini.version_token.is_some() {
            self.ini.version_token = user.ini.version_token;
        }
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("csurf").join("config.toml"))
}

fn merge_runtime(base: &mut RuntimeConfig, user: RuntimeConfig) {
    if user.latch_time_ms.is_some() {
        base.latch_time_ms = user.latch_time_ms;
    }
    if user.hold_delay_ms.is_some() {
        base.hold_delay_ms = user.hold_delay_ms;
    }
    if user.poll_interval_ms.is_some() {
        base.poll_interval_ms = user.poll_interval_ms;
    }
    if user.resource_path.is_some() {
        base.resource_path = user.resource_path;
    }
}

fn merge_steps(base: &mut StepsConfig, user: StepsConfig) {
    if user.min_param_steps.is_some() {
        base.min_param_steps = user.min_param_steps;
    }
    if user.max_param_steps.is_some() {
        base.max_param_steps = user.max_param_steps;
    }
    if let Some(user_ticks) = user.base_tick_counts {
        base.base_tick_counts
            .get_or_insert_with(BTreeMap::new)
            .extend(user_ticks);
    }
}

fn merge_display(base: &mut DisplayConfig, user: DisplayConfig) {
    if user.surface_in_display.is_some() {
        base.surface_in_display = user.surface_in_display;
    }
    if user.surface_out_display.is_some() {
        base.surface_out_display = user.surface_out_display;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_embedded_config() {
        let config = Config::embedded();
        assert_eq!(config.latch_time_ms(), 100.0);
        assert_eq!(config.hold_delay_ms(), 1000.0);
        assert_eq!(config.min_param_steps(), 2);
        assert_eq!(config.max_param_steps(), 30);
        assert_eq!(config.version_token(), "Version 3.0");
        assert!(config.resource_path().is_none());
    }

    #[test]
    fn test_base_tick_count_lookup() {
        let config = Config::embedded();
        assert_eq!(config.base_tick_count(2), 250);
        assert_eq!(config.base_tick_count(20), 1);
        // beyond the table: closest smaller entry
        assert_eq!(config.base_tick_count(28), 1);
        // below the table
        assert_eq!(config.base_tick_count(1), 1);
    }

    #[test]
    fn test_user_overrides_merge() {
        let config = Config::with_overrides(
            "[runtime]\nlatch_time_ms = 250\n[steps.base_tick_counts]\n2 = 7\n",
        )
        .unwrap();
        assert_eq!(config.latch_time_ms(), 250.0);
        assert_eq!(config.hold_delay_ms(), 1000.0);
        assert_eq!(config.base_tick_count(2), 7);
        assert_eq!(config.base_tick_count(3), 150);
    }

    #[test]
    fn test_malformed_override_is_error() {
        assert!(Config::with_overrides("[runtime\n").is_err());
    }
}
