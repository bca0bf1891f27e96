use livedoc::directive::Mode;

pub const DEFAULT_GOTO_LIMIT: usize = 8;

/// Execution settings, built once by the caller and shared by every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Mode used when a directive does not name one.
    pub default_mode: Mode,
    /// Maximum traversals of one goto target per frame.
    pub goto_limit: usize,
    pub default_provider: Option<String>,
    pub default_model: Option<String>,
    pub llm_header: String,
    pub shell_header: String,
    pub return_header: String,
    /// Header placed above a literal `run` prompt.
    pub input_header: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_mode: Mode::Append,
            goto_limit: DEFAULT_GOTO_LIMIT,
            default_provider: None,
            default_model: None,
            llm_header: "# LLM response block".to_string(),
            shell_header: "# OS Shell Tool response block".to_string(),
            return_header: "# Return block".to_string(),
            input_header: "# Input Parameters {id=input-parameters}".to_string(),
        }
    }
}

impl Config {
    /// The directive's own mode, or the configured default.
    pub fn mode_or_default(&self, mode: Option<Mode>) -> Mode {
        mode.unwrap_or(self.default_mode)
    }
}
