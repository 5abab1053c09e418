//! CLI backend definitions for different AI tools.

use orc_core::AdapterSettings;

/// How to pass prompts to the CLI tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    /// Pass prompt as a command-line argument.
    Arg,
    /// Write prompt to stdin.
    Stdin,
}

/// A CLI backend configuration for executing prompts.
#[derive(Debug, Clone)]
pub struct CliBackend {
    /// The command to execute.
    pub command: String,
    /// Additional arguments before the prompt.
    pub args: Vec<String>,
    /// How to pass the prompt.
    pub prompt_mode: PromptMode,
    /// Argument flag for prompt (if prompt_mode is Arg).
    pub prompt_flag: Option<String>,
}

impl CliBackend {
    /// Creates a backend from a named backend key and its configured
    /// settings (spec §4.2 "Process execution"). `name` is the adapter key
    /// in `OrchestratorConfig::adapters` (e.g. `"claude"`, `"custom"`).
    pub fn from_settings(name: &str, settings: &AdapterSettings) -> Self {
        match name {
            "claude" => Self::claude(),
            "kiro" => Self::kiro(),
            "gemini" => Self::gemini(),
            "codex" => Self::codex(),
            "amp" => Self::amp(),
            _ => Self::custom(settings),
        }
    }

    /// Creates the Claude backend.
    pub fn claude() -> Self {
        Self {
            command: "claude".to_string(),
            args: vec!["--dangerously-skip-permissions".to_string()],
            prompt_mode: PromptMode::Arg,
            prompt_flag: Some("-p".to_string()),
        }
    }

    /// Creates the Kiro backend.
    ///
    /// Uses kiro-cli in headless mode with all tools trusted.
    pub fn kiro() -> Self {
        Self {
            command: "kiro-cli".to_string(),
            args: vec![
                "chat".to_string(),
                "--no-interactive".to_string(),
                "--trust-all-tools".to_string(),
            ],
            prompt_mode: PromptMode::Arg,
            prompt_flag: None,
        }
    }

    /// Creates the Gemini backend.
    pub fn gemini() -> Self {
        Self {
            command: "gemini".to_string(),
            args: vec![],
            prompt_mode: PromptMode::Stdin,
            prompt_flag: None,
        }
    }

    /// Creates the Codex backend.
    pub fn codex() -> Self {
        Self {
            command: "codex".to_string(),
            args: vec![],
            prompt_mode: PromptMode::Arg,
            prompt_flag: Some("--prompt".to_string()),
        }
    }

    /// Creates the Amp backend.
    pub fn amp() -> Self {
        Self {
            command: "amp".to_string(),
            args: vec![],
            prompt_mode: PromptMode::Stdin,
            prompt_flag: None,
        }
    }

    /// Creates a custom backend from adapter settings. Defaults to
    /// argument-mode since most unlisted CLIs accept a trailing prompt arg.
    pub fn custom(settings: &AdapterSettings) -> Self {
        let command = settings.command.clone().unwrap_or_else(|| "echo".to_string());
        Self {
            command,
            args: vec![],
            prompt_mode: PromptMode::Arg,
            prompt_flag: None,
        }
    }

    /// Builds the full command with arguments for execution.
    pub fn build_command(&self, prompt: &str) -> (String, Vec<String>, Option<String>) {
        let mut args = self.args.clone();

        let stdin_input = match self.prompt_mode {
            PromptMode::Arg => {
                if let Some(ref flag) = self.prompt_flag {
                    args.push(flag.clone());
                }
                args.push(prompt.to_string());
                None
            }
            PromptMode::Stdin => Some(prompt.to_string()),
        };

        (self.command.clone(), args, stdin_input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claude_backend() {
        let backend = CliBackend::claude();
        let (cmd, args, stdin) = backend.build_command("test prompt");

        assert_eq!(cmd, "claude");
        assert_eq!(
            args,
            vec!["--dangerously-skip-permissions", "-p", "test prompt"]
        );
        assert!(stdin.is_none());
    }

    #[test]
    fn test_kiro_backend() {
        let backend = CliBackend::kiro();
        let (cmd, args, stdin) = backend.build_command("test prompt");

        assert_eq!(cmd, "kiro-cli");
        assert_eq!(
            args,
            vec!["chat", "--no-interactive", "--trust-all-tools", "test prompt"]
        );
        assert!(stdin.is_none());
    }

    #[test]
    fn test_gemini_backend() {
        let backend = CliBackend::gemini();
        let (cmd, args, stdin) = backend.build_command("test prompt");

        assert_eq!(cmd, "gemini");
        assert!(args.is_empty());
        assert_eq!(stdin, Some("test prompt".to_string()));
    }

    #[test]
    fn test_from_settings() {
        let settings = AdapterSettings::default();
        let backend = CliBackend::from_settings("claude", &settings);

        assert_eq!(backend.command, "claude");
        assert_eq!(backend.prompt_mode, PromptMode::Arg);
    }

    #[test]
    fn test_from_settings_custom_uses_configured_command() {
        let settings = AdapterSettings {
            command: Some("my-agent".to_string()),
            ..AdapterSettings::default()
        };
        let backend = CliBackend::from_settings("my-agent", &settings);
        assert_eq!(backend.command, "my-agent");
    }
}
