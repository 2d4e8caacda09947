//! Recognition engine backed by an external process
//!
//! The configured command is started once per session and reports engine
//! callbacks as newline-delimited JSON on stdout:
//!
//! ```text
//! {"type":"ready"}
//! {"type":"partial","matches":["hel"]}
//! {"type":"final","matches":["hello"]}
//! {"type":"error","code":7}
//! ```

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    ActiveRecognition, EngineError, EventSink, RecognitionEngine, RecognitionErrorCode,
    RecognitionEvent, RecognitionRequest,
};

/// One line of recognizer output
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EngineLine {
    Ready,
    Begin,
    End,
    Partial {
        #[serde(default)]
        matches: Vec<String>,
    },
    Final {
        #[serde(default)]
        matches: Vec<String>,
    },
    Error {
        code: i32,
    },
}

impl From<EngineLine> for RecognitionEvent {
    fn from(line: EngineLine) -> Self {
        match line {
            EngineLine::Ready => RecognitionEvent::ReadyForSpeech,
            EngineLine::Begin => RecognitionEvent::BeginningOfSpeech,
            EngineLine::End => RecognitionEvent::EndOfSpeech,
            EngineLine::Partial { matches } => RecognitionEvent::Partial(matches),
            EngineLine::Final { matches } => RecognitionEvent::Final(matches),
            EngineLine::Error { code } => RecognitionEvent::Error(code),
        }
    }
}

pub struct ProcessRecognizer {
    program: String,
    /// Location of `program`, looked up once at construction
    resolved: Option<PathBuf>,
    args: Vec<String>,
}

impl ProcessRecognizer {
    /// Build from a program followed by its arguments. `None` if empty.
    pub fn new(command: Vec<String>) -> Option<Self> {
        let mut parts = command.into_iter();
        let program = parts.next()?;
        let resolved = resolve_program(&program);
        if resolved.is_none() {
            warn!(%program, "recognizer program not found");
        }

        Some(Self {
            program,
            resolved,
            args: parts.collect(),
        })
    }
}

/// Find `program` on disk, searching PATH for bare names
fn resolve_program(program: &str) -> Option<PathBuf> {
    let path = Path::new(program);
    if path.components().count() > 1 {
        return path.is_file().then(|| path.to_path_buf());
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(path))
        .find(|candidate| candidate.is_file())
}

impl RecognitionEngine for ProcessRecognizer {
    fn is_available(&self) -> bool {
        self.resolved.is_some()
    }

    fn start(
        &self,
        request: &RecognitionRequest,
        sink: EventSink,
    ) -> Result<Box<dyn ActiveRecognition>, EngineError> {
        let program = self.resolved.as_ref().ok_or(EngineError::NotConfigured)?;

        let mut command = Command::new(program);
        command
            .args(&self.args)
            .arg("--language")
            .arg(&request.language)
            .arg("--max-results")
            .arg(request.max_results.to_string());
        if request.partial_results {
            command.arg("--partial-results");
        }

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| {
            EngineError::Spawn(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "recognizer stdout not captured",
            ))
        })?;

        info!(
            program = %self.program,
            token = %sink.token(),
            language = %request.language,
            "recognizer process started"
        );

        let reader = tokio::spawn(read_events(stdout, sink));
        Ok(Box::new(ProcessRecognition { child, reader }))
    }
}

/// Forward recognizer output to the sink until the process exits
async fn read_events(stdout: ChildStdout, sink: EventSink) {
    let mut lines = BufReader::new(stdout).lines();
    let mut finished = false;

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let event: RecognitionEvent = match serde_json::from_str::<EngineLine>(&line) {
                    Ok(parsed) => parsed.into(),
                    Err(e) => {
                        warn!(?e, %line, "unparseable recognizer output");
                        continue;
                    }
                };
                finished |= matches!(
                    event,
                    RecognitionEvent::Final(_) | RecognitionEvent::Error(_)
                );
                if !sink.emit(event) {
                    return;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(?e, "failed to read recognizer output");
                break;
            }
        }
    }

    if !finished {
        debug!(token = %sink.token(), "recognizer exited without a result");
        sink.emit(RecognitionEvent::Error(RecognitionErrorCode::CLIENT));
    }
}

struct ProcessRecognition {
    child: Child,
    reader: JoinHandle<()>,
}

impl ActiveRecognition for ProcessRecognition {
    fn cancel(&mut self) {
        self.reader.abort();
        if let Err(e) = self.child.start_kill() {
            debug!(?e, "recognizer process already gone");
        }
    }
}

impl Drop for ProcessRecognition {
    fn drop(&mut self) {
        // the child itself is killed on drop
        self.reader.abort();
    }
}
