//! Configuration loading and management

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::permission::PermissionState;

/// Answer given by the headless microphone prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptResponse {
    Grant,
    Deny,
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Recognizer program and arguments; recognition is unavailable when empty
    pub recognizer_command: Vec<String>,

    /// espeak-ng binary used for synthesis
    pub espeak_bin: String,

    /// Microphone permission at startup
    pub microphone: PermissionState,

    pub prompt_response: PromptResponse,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        Self::from_lookup(&home, |key| std::env::var(key).ok())
    }

    fn from_lookup(home: &str, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("voice-assistant");

        let socket_path = var("VOICE_ASSISTANT_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let recognizer_command = var("VOICE_ASSISTANT_RECOGNIZER")
            .map(|cmd| cmd.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let espeak_bin = var("ESPEAK_BIN").unwrap_or_else(|| "espeak-ng".to_string());

        let microphone = match var("VOICE_ASSISTANT_MICROPHONE").as_deref() {
            None | Some("prompt") => PermissionState::Undetermined,
            Some("granted") => PermissionState::Granted,
            Some("denied") => PermissionState::Denied,
            Some(other) => bail!("invalid VOICE_ASSISTANT_MICROPHONE value: {other}"),
        };

        let prompt_response = match var("VOICE_ASSISTANT_PROMPT_RESPONSE").as_deref() {
            None | Some("grant") => PromptResponse::Grant,
            Some("deny") => PromptResponse::Deny,
            Some(other) => bail!("invalid VOICE_ASSISTANT_PROMPT_RESPONSE value: {other}"),
        };

        Ok(Self {
            socket_path,
            data_dir,
            recognizer_command,
            espeak_bin,
            microphone,
            prompt_response,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup("/home/tester", |key| vars.get(key).cloned())
    }

    #[test]
    fn test_config_defaults() {
        let config = load(&[]).unwrap();
        assert!(config.socket_path.to_string_lossy().contains("voice-assistant"));
        assert!(config.recognizer_command.is_empty());
        assert_eq!(config.espeak_bin, "espeak-ng");
        assert_eq!(config.microphone, PermissionState::Undetermined);
        assert_eq!(config.prompt_response, PromptResponse::Grant);
    }

    #[test]
    fn test_config_overrides() {
        let config = load(&[
            ("VOICE_ASSISTANT_SOCKET", "/tmp/voice.sock"),
            ("VOICE_ASSISTANT_RECOGNIZER", "vosk-stream --model small"),
            ("VOICE_ASSISTANT_MICROPHONE", "granted"),
            ("VOICE_ASSISTANT_PROMPT_RESPONSE", "deny"),
        ])
        .unwrap();

        assert_eq!(config.socket_path, PathBuf::from("/tmp/voice.sock"));
        assert_eq!(config.recognizer_command, vec!["vosk-stream", "--model", "small"]);
        assert_eq!(config.microphone, PermissionState::Granted);
        assert_eq!(config.prompt_response, PromptResponse::Deny);
    }

    #[test]
    fn test_config_rejects_unknown_permission() {
        assert!(load(&[("VOICE_ASSISTANT_MICROPHONE", "maybe")]).is_err());
    }
}
