use std::path::Path;

use serde::Deserialize;

use interpreter::Config;
use livedoc::directive::Mode;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub default_operation: Option<String>,

    #[serde(default)]
    pub default_provider: Option<String>,

    #[serde(default)]
    pub goto_limit: Option<usize>,

    #[serde(default)]
    pub llm: LlmSettings,

    /// Extra variables for `@shell` commands.
    #[serde(default)]
    pub environment: Vec<EnvVar>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmSettings {
    /// Process that receives the prompt on stdin and prints the reply.
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

/// Flags that take precedence over the settings file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub mode: Option<String>,
}

impl Settings {
    /// Read `path`; a missing file means defaults.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(e) => return Err(format!("cannot read '{}': {}", path.display(), e)),
        };
        toml::from_str(&text).map_err(|e| format!("invalid settings '{}': {}", path.display(), e))
    }

    pub fn to_config(&self, overrides: &Overrides) -> Result<Config, String> {
        let mut config = Config::default();
        if let Some(mode) = overrides.mode.as_ref().or(self.default_operation.as_ref()) {
            config.default_mode = mode.parse::<Mode>().map_err(|e| e.to_string())?;
        }
        if let Some(limit) = self.goto_limit {
            config.goto_limit = limit;
        }
        config.default_provider = overrides.provider.clone().or_else(|| self.default_provider.clone());
        config.default_model = overrides.model.clone().or_else(|| self.llm.model.clone());
        Ok(config)
    }
}
