//! Scriptable engines for tests

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::engine::{
    ActiveRecognition, EngineError, EventSink, InitSink, LanguageSupport, RecognitionEngine,
    RecognitionRequest, SynthesisProvider, Synthesizer, STATUS_SUCCESS,
};
use crate::language::LanguageTag;

struct FakeSession {
    request: RecognitionRequest,
    sink: EventSink,
    cancelled: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
}

/// Recognizer that records each started session and hands out its sink
pub struct FakeRecognizer {
    available: AtomicBool,
    fail_next: AtomicBool,
    sessions: Mutex<Vec<FakeSession>>,
}

impl FakeRecognizer {
    pub fn new(available: bool) -> Arc<Self> {
        Arc::new(Self {
            available: AtomicBool::new(available),
            fail_next: AtomicBool::new(false),
            sessions: Mutex::new(Vec::new()),
        })
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn fail_next_start(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn sink(&self, index: usize) -> EventSink {
        self.sessions.lock().unwrap()[index].sink.clone()
    }

    pub fn request(&self, index: usize) -> RecognitionRequest {
        self.sessions.lock().unwrap()[index].request.clone()
    }

    pub fn cancelled(&self, index: usize) -> bool {
        self.sessions.lock().unwrap()[index]
            .cancelled
            .load(Ordering::SeqCst)
    }

    pub fn released(&self, index: usize) -> bool {
        self.sessions.lock().unwrap()[index]
            .released
            .load(Ordering::SeqCst)
    }

    /// Wait until at least `count` sessions were started
    pub async fn wait_for_sessions(&self, count: usize) {
        for _ in 0..500 {
            if self.session_count() >= count {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        panic!("recognizer never reached {} sessions", count);
    }
}

impl RecognitionEngine for FakeRecognizer {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn start(
        &self,
        request: &RecognitionRequest,
        sink: EventSink,
    ) -> Result<Box<dyn ActiveRecognition>, EngineError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(EngineError::Spawn(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "scripted start failure",
            )));
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let released = Arc::new(AtomicBool::new(false));
        self.sessions.lock().unwrap().push(FakeSession {
            request: request.clone(),
            sink,
            cancelled: cancelled.clone(),
            released: released.clone(),
        });

        Ok(Box::new(FakeHandle {
            cancelled,
            released,
        }))
    }
}

struct FakeHandle {
    cancelled: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
}

impl ActiveRecognition for FakeHandle {
    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Synthesis provider whose initialization is completed by the test
pub struct FakeSynthesis {
    /// Status reported right away on creation, `None` to hold it back
    auto_init: Option<i32>,
    speak_status: Arc<AtomicI32>,
    unsupported: Vec<String>,
    created: AtomicUsize,
    held_inits: Mutex<Vec<InitSink>>,
    spoken: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeSynthesis {
    pub fn new(auto_init: Option<i32>) -> Arc<Self> {
        Self::with_unsupported(auto_init, &[])
    }

    pub fn with_unsupported(auto_init: Option<i32>, unsupported: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            auto_init,
            speak_status: Arc::new(AtomicI32::new(STATUS_SUCCESS)),
            unsupported: unsupported.iter().map(|s| s.to_string()).collect(),
            created: AtomicUsize::new(0),
            held_inits: Mutex::new(Vec::new()),
            spoken: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn set_speak_status(&self, status: i32) {
        self.speak_status.store(status, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Complete the oldest held initialization
    pub fn finish_init(&self, status: i32) {
        let init = self.held_inits.lock().unwrap().remove(0);
        init.complete(status);
    }

    pub fn held_inits(&self) -> usize {
        self.held_inits.lock().unwrap().len()
    }

    /// `(language, text)` pairs handed to the engine
    pub fn spoken(&self) -> Vec<(String, String)> {
        self.spoken.lock().unwrap().clone()
    }

    pub async fn wait_for_inits(&self, count: usize) {
        for _ in 0..500 {
            if self.held_inits() >= count {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        panic!("synthesis never reached {} held inits", count);
    }
}

impl SynthesisProvider for FakeSynthesis {
    fn create(&self, init: InitSink) -> Result<Box<dyn Synthesizer>, EngineError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        match self.auto_init {
            Some(status) => init.complete(status),
            None => self.held_inits.lock().unwrap().push(init),
        }

        Ok(Box::new(FakeSynthesizer {
            language: String::new(),
            unsupported: self.unsupported.clone(),
            speak_status: self.speak_status.clone(),
            spoken: self.spoken.clone(),
        }))
    }
}

struct FakeSynthesizer {
    language: String,
    unsupported: Vec<String>,
    speak_status: Arc<AtomicI32>,
    spoken: Arc<Mutex<Vec<(String, String)>>>,
}

impl Synthesizer for FakeSynthesizer {
    fn set_language(&mut self, language: &LanguageTag) -> LanguageSupport {
        let primary = language.as_str().split('-').next().unwrap_or_default();
        if self.unsupported.iter().any(|u| u == primary) {
            return LanguageSupport::NotSupported;
        }
        self.language = language.to_string();
        LanguageSupport::Available
    }

    fn speak_flush(&mut self, text: &str, _utterance_id: &str) -> i32 {
        self.spoken
            .lock()
            .unwrap()
            .push((self.language.clone(), text.to_string()));
        self.speak_status.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {}
}
