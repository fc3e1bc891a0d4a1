//! Process configuration - read once from the environment at startup.
//!
//! Missing API keys are not an error here. Each component reports its own
//! missing credential the first time it needs it.

use crate::types::Secret;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_WEATHER_URL: &str = "https://api.nasa.gov/insight_weather/";
pub const DEFAULT_SEARCH_URL: &str = "https://mcp.exa.ai/mcp";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_TOOL_ITERATIONS: usize = 10;

/// Which persona drives the conversation loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Persona {
    /// Broad assistant with weather and search tools.
    #[default]
    Assistant,
    /// Narrow weather agent that always consults the weather tool.
    Weather,
}

impl FromStr for Persona {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "assistant" | "facts" => Ok(Self::Assistant),
            "weather" => Ok(Self::Weather),
            other => Err(format!("unknown persona: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MesaConfig {
    pub nasa_api_key: Option<Secret>,
    pub exa_api_key: Option<Secret>,
    pub anthropic_api_key: Option<Secret>,
    pub anthropic_base_url: Option<String>,
    pub model: String,
    pub weather_url: String,
    pub search_url: String,
    pub persona: Persona,
    pub max_tool_iterations: usize,
    pub log_file: Option<PathBuf>,
}

impl Default for MesaConfig {
    fn default() -> Self {
        Self {
            nasa_api_key: None,
            exa_api_key: None,
            anthropic_api_key: None,
            anthropic_base_url: None,
            model: DEFAULT_MODEL.to_string(),
            weather_url: DEFAULT_WEATHER_URL.to_string(),
            search_url: DEFAULT_SEARCH_URL.to_string(),
            persona: Persona::default(),
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            log_file: None,
        }
    }
}

impl MesaConfig {
    /// Load from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let persona = match get("MESA_PERSONA") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!("{}, using assistant", e);
                Persona::Assistant
            }),
            None => defaults.persona,
        };

        let max_tool_iterations = match get("MESA_MAX_TOOL_ITERATIONS") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    warn!(
                        "invalid MESA_MAX_TOOL_ITERATIONS={:?}, using {}",
                        raw, DEFAULT_MAX_TOOL_ITERATIONS
                    );
                    DEFAULT_MAX_TOOL_ITERATIONS
                }
            },
            None => defaults.max_tool_iterations,
        };

        Self {
            nasa_api_key: get("NASA_API_KEY").map(Secret::from),
            exa_api_key: get("EXA_API_KEY").map(Secret::from),
            anthropic_api_key: get("ANTHROPIC_API_KEY").map(Secret::from),
            anthropic_base_url: get("ANTHROPIC_BASE_URL"),
            model: get("MESA_MODEL").unwrap_or(defaults.model),
            weather_url: get("MESA_WEATHER_URL").unwrap_or(defaults.weather_url),
            search_url: get("MESA_SEARCH_URL").unwrap_or(defaults.search_url),
            persona,
            max_tool_iterations,
            log_file: get("MESA_LOG_FILE").map(PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = MesaConfig::from_lookup(lookup(&[]));
        assert!(config.nasa_api_key.is_none());
        assert!(config.exa_api_key.is_none());
        assert_eq!(config.weather_url, DEFAULT_WEATHER_URL);
        assert_eq!(config.search_url, DEFAULT_SEARCH_URL);
        assert_eq!(config.persona, Persona::Assistant);
        assert_eq!(config.max_tool_iterations, DEFAULT_MAX_TOOL_ITERATIONS);
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let config = MesaConfig::from_lookup(lookup(&[("NASA_API_KEY", "  ")]));
        assert!(config.nasa_api_key.is_none());
    }

    #[test]
    fn keys_and_overrides_are_read() {
        let config = MesaConfig::from_lookup(lookup(&[
            ("NASA_API_KEY", "nasa"),
            ("EXA_API_KEY", "exa"),
            ("MESA_PERSONA", "Weather"),
            ("MESA_MAX_TOOL_ITERATIONS", "3"),
            ("MESA_SEARCH_URL", "http://localhost:9/mcp"),
        ]));
        assert_eq!(config.nasa_api_key.unwrap().expose(), "nasa");
        assert_eq!(config.exa_api_key.unwrap().expose(), "exa");
        assert_eq!(config.persona, Persona::Weather);
        assert_eq!(config.max_tool_iterations, 3);
        assert_eq!(config.search_url, "http://localhost:9/mcp");
    }

    #[test]
    fn bad_values_fall_back() {
        let config = MesaConfig::from_lookup(lookup(&[
            ("MESA_PERSONA", "g-man"),
            ("MESA_MAX_TOOL_ITERATIONS", "zero"),
        ]));
        assert_eq!(config.persona, Persona::Assistant);
        assert_eq!(config.max_tool_iterations, DEFAULT_MAX_TOOL_ITERATIONS);
    }

    #[test]
    fn debug_output_hides_keys() {
        let config = MesaConfig::from_lookup(lookup(&[("EXA_API_KEY", "super-secret")]));
        let dbg = format!("{:?}", config);
        assert!(!dbg.contains("super-secret"));
    }
}
