//! # Built-in Plugins
//!
//! | Menu | Plugin | Feature |
//! |---|---|---|
//! | 1 | [`gopher::GopherPlugin`] - browse a local directory tree | always |
//! | 2 | `llm::LlmPlugin` - chat with an Ollama model | `llm` |
//! | 3 | `weather::WeatherPlugin` - Open-Meteo conditions at the node's GPS fix | `weather` |
//! | 4 | `wikipedia::WikipediaPlugin` - search and read article summaries | `wikipedia` |
//!
//! Network plugins share [`http`] for client setup and error wording. Each
//! plugin can also be switched off in the `[plugins.*]` config sections.

pub mod gopher;
#[cfg(any(feature = "llm", feature = "weather", feature = "wikipedia"))]
pub mod http;
#[cfg(feature = "llm")]
pub mod llm;
#[cfg(feature = "weather")]
pub mod weather;
#[cfg(feature = "wikipedia")]
pub mod wikipedia;

use anyhow::Result;
use log::info;
use std::sync::Arc;

use crate::config::Config;
use crate::gateway::PluginRegistry;

/// Register every built-in plugin enabled in `config`. Returns how many were added.
pub fn register_builtin(config: &Config, registry: &mut PluginRegistry) -> Result<usize> {
    let before = registry.len();
    let plugins = &config.plugins;

    if plugins.gopher.enabled {
        registry.register(Arc::new(gopher::GopherPlugin::from_config(&plugins.gopher)?))?;
    }

    if plugins.llm.enabled {
        #[cfg(feature = "llm")]
        registry.register(Arc::new(llm::LlmPlugin::from_config(&plugins.llm)?))?;
        #[cfg(not(feature = "llm"))]
        log::warn!("plugins.llm is enabled but this build lacks the 'llm' feature");
    }

    if plugins.weather.enabled {
        #[cfg(feature = "weather")]
        registry.register(Arc::new(weather::WeatherPlugin::from_config(&plugins.weather)?))?;
        #[cfg(not(feature = "weather"))]
        log::warn!("plugins.weather is enabled but this build lacks the 'weather' feature");
    }

    if plugins.wikipedia.enabled {
        #[cfg(feature = "wikipedia")]
        registry.register(Arc::new(wikipedia::WikipediaPlugin::from_config(&plugins.wikipedia)?))?;
        #[cfg(not(feature = "wikipedia"))]
        log::warn!("plugins.wikipedia is enabled but this build lacks the 'wikipedia' feature");
    }

    let added = registry.len() - before;
    info!("Registered {} built-in plugin(s): {:?}", added, registry);
    Ok(added)
}

/// Cut `text` to at most `max_chars` characters, ending in "..." when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("exactly10!", 10), "exactly10!");
    }

    #[test]
    fn truncate_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("ééééééé", 5), "éé...");
        assert_eq!(truncate_chars("abcdefghij", 6), "abc...");
    }

    #[test]
    fn disabled_plugins_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.plugins.gopher.root_directory = tmp.path().to_string_lossy().into_owned();
        config.plugins.llm.enabled = false;
        config.plugins.weather.enabled = false;
        config.plugins.wikipedia.enabled = false;
        let mut registry = PluginRegistry::new();
        assert_eq!(register_builtin(&config, &mut registry).unwrap(), 1);
        assert!(registry.lookup_by_menu(1).is_some());
    }
}
