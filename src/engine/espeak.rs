//! Speech synthesis through the espeak-ng command line tool

use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{
    EngineError, InitSink, LanguageSupport, SynthesisProvider, Synthesizer, STATUS_ERROR,
    STATUS_SUCCESS,
};
use crate::language::{LanguageTag, FALLBACK_LANGUAGE};

pub struct EspeakProvider {
    bin: String,
}

impl EspeakProvider {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

impl SynthesisProvider for EspeakProvider {
    fn create(&self, init: InitSink) -> Result<Box<dyn Synthesizer>, EngineError> {
        let bin = self.bin.clone();

        // Probe the binary off the caller's task, report through the sink
        tokio::spawn(async move {
            let probe = Command::new(&bin)
                .arg("--version")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;

            let status = match probe {
                Ok(exit) if exit.success() => STATUS_SUCCESS,
                Ok(exit) => {
                    warn!(%bin, ?exit, "espeak-ng probe failed");
                    STATUS_ERROR
                }
                Err(e) => {
                    warn!(%bin, ?e, "espeak-ng not runnable");
                    STATUS_ERROR
                }
            };
            init.complete(status);
        });

        Ok(Box::new(EspeakSynthesizer {
            bin: self.bin.clone(),
            voice: FALLBACK_LANGUAGE.to_string(),
            current: None,
        }))
    }
}

struct EspeakSynthesizer {
    bin: String,
    voice: String,
    /// Utterance currently playing
    current: Option<Child>,
}

impl Synthesizer for EspeakSynthesizer {
    fn set_language(&mut self, language: &LanguageTag) -> LanguageSupport {
        // espeak-ng voice names are lowercase tags: en-us, fr-fr, de
        self.voice = language.as_str().to_ascii_lowercase();
        LanguageSupport::Available
    }

    fn speak_flush(&mut self, text: &str, utterance_id: &str) -> i32 {
        self.stop();

        let spawned = Command::new(&self.bin)
            .arg("-v")
            .arg(&self.voice)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        match spawned {
            Ok(child) => {
                info!(utterance_id, voice = %self.voice, chars = text.len(), "utterance submitted");
                self.current = Some(child);
                STATUS_SUCCESS
            }
            Err(e) => {
                warn!(?e, utterance_id, "failed to start espeak-ng");
                STATUS_ERROR
            }
        }
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.current.take() {
            if let Err(e) = child.start_kill() {
                debug!(?e, "previous utterance already finished");
            }
        }
    }
}
