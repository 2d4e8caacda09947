//! Recognition session controller
//!
//! Owns at most one session at a time. Engine callbacks arrive tagged with
//! the token of the session that produced them; anything not matching the
//! active token is dropped before it can publish or resolve.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::machine::{RecognitionSession, SessionState};
use super::pending::PendingCall;
use crate::engine::{
    EngineMessage, EventSink, RecognitionEngine, RecognitionErrorCode, RecognitionEvent,
    RecognitionRequest, SessionToken,
};
use crate::error::VoiceError;
use crate::events::{Notification, NotificationChannel};
use crate::language::DEFAULT_REQUEST_LANGUAGE;
use crate::permission::PermissionGateway;

/// Candidates requested from the engine per recognition
pub const MAX_RESULTS: u32 = 1;

/// Caller options for a listening session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenOptions {
    pub language: String,
    pub partial_results: bool,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            language: DEFAULT_REQUEST_LANGUAGE.to_string(),
            partial_results: true,
        }
    }
}

/// Why a session is being torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    Superseded,
    Stopped,
    Shutdown,
}

pub struct RecognitionController {
    engine: Arc<dyn RecognitionEngine>,
    permissions: PermissionGateway,
    notifications: NotificationChannel,
    engine_tx: mpsc::UnboundedSender<EngineMessage>,
    last_token: SessionToken,
    active: Option<RecognitionSession>,
}

impl RecognitionController {
    pub fn new(
        engine: Arc<dyn RecognitionEngine>,
        permissions: PermissionGateway,
        notifications: NotificationChannel,
        engine_tx: mpsc::UnboundedSender<EngineMessage>,
    ) -> Self {
        Self {
            engine,
            permissions,
            notifications,
            engine_tx,
            last_token: SessionToken(0),
            active: None,
        }
    }

    /// The live session, if any
    pub fn active(&self) -> Option<&RecognitionSession> {
        self.active.as_ref()
    }

    pub fn start_listening(&mut self, options: ListenOptions, call: PendingCall<Vec<String>>) {
        if !self.permissions.check().is_granted() {
            info!("start rejected: microphone permission not granted");
            call.reject(VoiceError::PermissionDenied);
            return;
        }

        if !self.engine.is_available() {
            info!("start rejected: recognition engine unavailable");
            call.reject(VoiceError::EngineUnavailable);
            return;
        }

        // The old engine is gone before the new one is created
        self.teardown(Teardown::Superseded);

        let token = self.last_token.next();
        self.last_token = token;

        let request = RecognitionRequest {
            language: options.language.clone(),
            partial_results: options.partial_results,
            max_results: MAX_RESULTS,
        };

        match self
            .engine
            .start(&request, EventSink::new(token, self.engine_tx.clone()))
        {
            Ok(engine) => {
                info!(
                    %token,
                    language = %options.language,
                    partial_results = options.partial_results,
                    "listening session started"
                );
                self.active = Some(RecognitionSession::new(
                    token,
                    options.language,
                    options.partial_results,
                    call,
                    engine,
                ));
            }
            Err(e) => {
                warn!(%token, ?e, "recognition engine failed to start");
                call.reject(VoiceError::EngineUnavailable);
            }
        }
    }

    /// Tear down the active session. A no-op when nothing is listening.
    pub fn stop_listening(&mut self) {
        if self.active.is_none() {
            debug!("stop requested with no active session");
            return;
        }
        self.teardown(Teardown::Stopped);
    }

    /// Tear down the active session for good; its caller gets `ServiceUnavailable`
    pub fn shutdown(&mut self) {
        self.teardown(Teardown::Shutdown);
    }

    pub fn on_event(&mut self, token: SessionToken, event: RecognitionEvent) {
        let Some(session) = self.active.as_mut().filter(|s| s.token() == token) else {
            debug!(%token, ?event, "dropping event from stale session");
            return;
        };

        match event {
            RecognitionEvent::ReadyForSpeech
            | RecognitionEvent::BeginningOfSpeech
            | RecognitionEvent::EndOfSpeech => {
                debug!(%token, ?event, "engine lifecycle event");
            }

            RecognitionEvent::Partial(matches) => {
                if matches.is_empty() {
                    return;
                }
                self.notifications.publish(Notification::OnResult {
                    matches,
                    is_final: false,
                });
            }

            RecognitionEvent::Final(matches) => {
                self.notifications.publish(Notification::OnResult {
                    matches: matches.clone(),
                    is_final: true,
                });
                Self::resolve(session, matches);
            }

            RecognitionEvent::Error(code) => {
                info!(
                    %token,
                    code,
                    reason = %RecognitionErrorCode::from_code(code),
                    "recognition engine error"
                );
                self.notifications
                    .publish(Notification::OnError { error: code });
                Self::resolve(session, Vec::new());
            }
        }
    }

    fn resolve(session: &mut RecognitionSession, matches: Vec<String>) {
        if let Some(call) = session.take_pending() {
            call.resolve(matches);
        }
        if session.state() == SessionState::Listening {
            session.transition(SessionState::Resolved);
        }
    }

    /// Retire whatever session is active, rejecting its call if still bound
    fn teardown(&mut self, reason: Teardown) {
        let Some(mut session) = self.active.take() else {
            return;
        };

        if reason == Teardown::Superseded && session.state() == SessionState::Listening {
            session.transition(SessionState::Superseded);
        }

        if let Some(call) = session.take_pending() {
            call.reject(match reason {
                Teardown::Superseded => VoiceError::Superseded,
                Teardown::Stopped => VoiceError::Cancelled,
                Teardown::Shutdown => VoiceError::ServiceUnavailable,
            });
        }

        session.release_engine();
        session.transition(SessionState::Destroyed);
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast;

    use super::*;
    use crate::config::PromptResponse;
    use crate::permission::{ConfiguredHost, PermissionState};
    use crate::session::pending::Reply;
    use crate::testing::FakeRecognizer;

    struct Harness {
        controller: RecognitionController,
        engine: Arc<FakeRecognizer>,
        engine_rx: mpsc::UnboundedReceiver<EngineMessage>,
        events: broadcast::Receiver<Notification>,
    }

    impl Harness {
        fn new(permission: PermissionState) -> Self {
            let engine = FakeRecognizer::new(true);
            let host = Arc::new(ConfiguredHost::new(permission, PromptResponse::Grant));
            let notifications = NotificationChannel::new(16);
            let events = notifications.subscribe();
            let (engine_tx, engine_rx) = mpsc::unbounded_channel();

            let controller = RecognitionController::new(
                engine.clone(),
                PermissionGateway::new(host),
                notifications,
                engine_tx,
            );

            Self {
                controller,
                engine,
                engine_rx,
                events,
            }
        }

        fn start(&mut self, language: &str) -> Reply<Vec<String>> {
            let (call, reply) = PendingCall::new();
            self.controller.start_listening(
                ListenOptions {
                    language: language.into(),
                    partial_results: true,
                },
                call,
            );
            reply
        }

        /// Deliver everything the engine has emitted so far
        fn pump(&mut self) {
            while let Ok(message) = self.engine_rx.try_recv() {
                if let EngineMessage::Recognition { token, event } = message {
                    self.controller.on_event(token, event);
                }
            }
        }

        fn published(&mut self) -> Vec<Notification> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }
    }

    #[test]
    fn test_permission_denied() {
        let mut h = Harness::new(PermissionState::Denied);
        let mut reply = h.start("en-US");

        assert_eq!(reply.try_recv().unwrap(), Err(VoiceError::PermissionDenied));
        assert_eq!(h.engine.session_count(), 0);
    }

    #[test]
    fn test_engine_unavailable() {
        let mut h = Harness::new(PermissionState::Granted);
        h.engine.set_available(false);
        let mut reply = h.start("en-US");

        assert_eq!(reply.try_recv().unwrap(), Err(VoiceError::EngineUnavailable));
        assert!(h.controller.active().is_none());
    }

    #[test]
    fn test_engine_start_failure_leaves_no_session() {
        let mut h = Harness::new(PermissionState::Granted);
        let _first = h.start("en-US");
        h.engine.fail_next_start();
        let mut second = h.start("en-US");

        assert_eq!(second.try_recv().unwrap(), Err(VoiceError::EngineUnavailable));
        assert!(h.controller.active().is_none());
        assert!(h.engine.released(0));
    }

    #[test]
    fn test_engine_started_with_single_candidate() {
        let mut h = Harness::new(PermissionState::Granted);
        let _reply = h.start("de-DE");

        let request = h.engine.request(0);
        assert_eq!(request.language, "de-DE");
        assert!(request.partial_results);
        assert_eq!(request.max_results, 1);
    }

    #[test]
    fn test_partial_then_final() {
        let mut h = Harness::new(PermissionState::Granted);
        let mut reply = h.start("en-US");

        let sink = h.engine.sink(0);
        sink.emit(RecognitionEvent::ReadyForSpeech);
        sink.emit(RecognitionEvent::Partial(Vec::new()));
        sink.emit(RecognitionEvent::Partial(vec!["hel".into()]));
        sink.emit(RecognitionEvent::Final(vec!["hello".into()]));
        h.pump();

        assert_eq!(
            h.published(),
            vec![
                Notification::OnResult {
                    matches: vec!["hel".into()],
                    is_final: false,
                },
                Notification::OnResult {
                    matches: vec!["hello".into()],
                    is_final: true,
                },
            ]
        );
        assert_eq!(reply.try_recv().unwrap(), Ok(vec!["hello".to_string()]));
        assert_eq!(
            h.controller.active().map(|s| s.state()),
            Some(SessionState::Resolved)
        );
    }

    #[test]
    fn test_engine_error_resolves_empty() {
        let mut h = Harness::new(PermissionState::Granted);
        let mut reply = h.start("de-DE");

        h.engine.sink(0).emit(RecognitionEvent::Error(7));
        h.pump();

        assert_eq!(h.published(), vec![Notification::OnError { error: 7 }]);
        assert_eq!(reply.try_recv().unwrap(), Ok(Vec::new()));
    }

    #[test]
    fn test_error_after_final_publishes_without_second_resolution() {
        let mut h = Harness::new(PermissionState::Granted);
        let mut reply = h.start("en-US");

        let sink = h.engine.sink(0);
        sink.emit(RecognitionEvent::Final(vec!["hello".into()]));
        sink.emit(RecognitionEvent::Error(5));
        h.pump();

        assert_eq!(reply.try_recv().unwrap(), Ok(vec!["hello".to_string()]));
        assert_eq!(h.published().len(), 2);
        assert_eq!(
            h.controller.active().map(|s| s.state()),
            Some(SessionState::Resolved)
        );
    }

    #[test]
    fn test_superseded_session_is_silenced() {
        let mut h = Harness::new(PermissionState::Granted);
        let mut first = h.start("en-US");
        let mut second = h.start("fr-FR");

        assert_eq!(first.try_recv().unwrap(), Err(VoiceError::Superseded));
        assert!(h.engine.released(0));

        h.engine.sink(0).emit(RecognitionEvent::Final(vec!["stale".into()]));
        h.engine.sink(0).emit(RecognitionEvent::Error(7));
        h.pump();
        assert!(h.published().is_empty());
        assert!(second.try_recv().is_err());

        h.engine.sink(1).emit(RecognitionEvent::Final(vec!["bonjour".into()]));
        h.pump();
        assert_eq!(second.try_recv().unwrap(), Ok(vec!["bonjour".to_string()]));
    }

    #[test]
    fn test_resolved_session_replaced_without_rejection() {
        let mut h = Harness::new(PermissionState::Granted);
        let mut first = h.start("en-US");
        h.engine.sink(0).emit(RecognitionEvent::Final(vec!["one".into()]));
        h.pump();
        let _second = h.start("en-US");

        assert_eq!(first.try_recv().unwrap(), Ok(vec!["one".to_string()]));
        assert!(h.engine.released(0));
    }

    #[test]
    fn test_stop_without_session() {
        let mut h = Harness::new(PermissionState::Granted);
        h.controller.stop_listening();
        h.controller.stop_listening();

        assert!(h.published().is_empty());
        assert!(h.controller.active().is_none());
    }

    #[test]
    fn test_late_callbacks_after_stop() {
        let mut h = Harness::new(PermissionState::Granted);
        let mut reply = h.start("en-US");

        h.controller.stop_listening();
        assert_eq!(reply.try_recv().unwrap(), Err(VoiceError::Cancelled));
        assert!(h.engine.cancelled(0));

        h.engine.sink(0).emit(RecognitionEvent::Partial(vec!["late".into()]));
        h.engine.sink(0).emit(RecognitionEvent::Final(vec!["late".into()]));
        h.pump();
        assert!(h.published().is_empty());
    }

    #[test]
    fn test_tokens_increase() {
        let mut h = Harness::new(PermissionState::Granted);
        let _a = h.start("en-US");
        let _b = h.start("en-US");

        assert!(h.engine.sink(1).token() > h.engine.sink(0).token());
        assert_eq!(
            h.controller.active().map(|s| s.token()),
            Some(h.engine.sink(1).token())
        );
    }

    #[test]
    fn test_shutdown_rejects_live_session() {
        let mut h = Harness::new(PermissionState::Granted);
        let mut reply = h.start("en-US");

        h.controller.shutdown();

        assert_eq!(reply.try_recv().unwrap(), Err(VoiceError::ServiceUnavailable));
        assert!(h.controller.active().is_none());
        assert!(h.engine.released(0));
        assert!(h.published().is_empty());
    }
}
