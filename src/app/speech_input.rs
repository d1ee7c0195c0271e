use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::adapters::{PlatformRecognizer, RecognizerEventHandler};
use crate::app::audio_session::AudioSessionManager;
use crate::app::transcript::reconcile;
use crate::domain::config::RecognitionConfig;
use crate::domain::{
    CaptureEvent, CaptureState, RecognizerEvent, SessionId, SpeechError, TranscriptState,
};
use crate::ports::RecognizerOptions;

const EVENT_CAPACITY: usize = 64;

struct InputState {
    session_id: SessionId,
    capture: CaptureState,
    transcript: TranscriptState,
    /// Set by `stop_capture()`; the recognizer's aborted/end reports that
    /// follow are expected.
    stopping_intentionally: bool,
    language: String,
    last_error: Option<SpeechError>,
}

struct Inner {
    recognizer: PlatformRecognizer,
    audio_session: Arc<AudioSessionManager>,
    recognition: RecognitionConfig,
    restart_on_silence: bool,
    state: Mutex<InputState>,
    events: mpsc::UnboundedSender<(SessionId, RecognizerEvent)>,
    published: broadcast::Sender<CaptureEvent>,
}

/// Owns the single capture session.
///
/// Recognizer events are tagged with the session that started the recognizer
/// and applied by one dispatch task. Events from an older session, or arriving
/// after the session left `Listening`, are dropped.
#[derive(Clone)]
pub struct SpeechInputCoordinator {
    inner: Arc<Inner>,
}

impl SpeechInputCoordinator {
    /// Must be called from within a Tokio runtime.
    pub fn new(
        recognizer: PlatformRecognizer,
        audio_session: Arc<AudioSessionManager>,
        recognition: RecognitionConfig,
        restart_on_silence: bool,
    ) -> Self {
        let (events, mut receiver) = mpsc::unbounded_channel();
        let (published, _) = broadcast::channel(EVENT_CAPACITY);

        let inner = Arc::new(Inner {
            recognizer,
            audio_session,
            recognition,
            restart_on_silence,
            state: Mutex::new(InputState {
                session_id: SessionId::default(),
                capture: CaptureState::Idle,
                transcript: TranscriptState::default(),
                stopping_intentionally: false,
                language: String::new(),
                last_error: None,
            }),
            events,
            published,
        });

        let weak = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some((session_id, event)) = receiver.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.dispatch(session_id, event).await;
            }
            debug!("Capture dispatch loop finished");
        });

        Self { inner }
    }

    pub fn state(&self) -> CaptureState {
        self.inner.state.lock().capture
    }

    pub fn transcript(&self) -> TranscriptState {
        self.inner.state.lock().transcript.clone()
    }

    pub fn last_error(&self) -> Option<SpeechError> {
        self.inner.state.lock().last_error.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.inner.published.subscribe()
    }

    /// Start listening. `base_text` is whatever the input already holds; the
    /// transcript is appended to it.
    pub async fn start_capture(&self, language: &str, base_text: &str) -> Result<(), SpeechError> {
        {
            let state = self.inner.state.lock();
            if !state.capture.can_start() {
                return Err(SpeechError::CaptureStateTransition {
                    from: state.capture,
                    to: CaptureState::Listening,
                });
            }
        }

        if let Err(e) = self.inner.recognizer.request_permission().await {
            let mut state = self.inner.state.lock();
            state.session_id = state.session_id.next();
            self.inner.fail(&mut state, e.clone());
            return Err(e);
        }

        let session_id = {
            let mut state = self.inner.state.lock();
            if !state.capture.can_start() {
                return Err(SpeechError::CaptureStateTransition {
                    from: state.capture,
                    to: CaptureState::Listening,
                });
            }
            state.session_id = state.session_id.next();
            state.transcript = TranscriptState::new(base_text);
            state.stopping_intentionally = false;
            state.language = language.to_string();
            state.last_error = None;
            self.inner.transition(&mut state, CaptureState::Listening)?;
            state.session_id
        };

        info!(session = %session_id, language, "Capture started");
        self.inner.audio_session.mark_capture_started();
        self.inner.start_recognizer(session_id, language).await
    }

    /// Stop listening and return the final transcript. Calling it again
    /// returns the same transcript and touches nothing.
    pub async fn stop_capture(&self) -> String {
        let (session_id, text) = {
            let mut state = self.inner.state.lock();
            if state.capture != CaptureState::Listening {
                return state.transcript.finish();
            }
            state.stopping_intentionally = true;
            self.inner.end_listening(&mut state);
            (state.session_id, state.transcript.finish())
        };

        info!(session = %session_id, chars = text.chars().count(), "Capture stopped");
        self.inner.audio_session.mark_capture_stopped();
        if let Err(e) = self.inner.recognizer.stop().await {
            debug!(error = %e, "Recognizer stop failed");
        }
        text
    }
}

fn transition_allowed(from: CaptureState, to: CaptureState) -> bool {
    use CaptureState::*;
    matches!(
        (from, to),
        (Idle, Listening)
            | (Idle, Error)
            | (Listening, Stopped)
            | (Listening, Error)
            | (Stopped, Idle)
            | (Error, Idle)
    )
}

impl Inner {
    fn publish(&self, event: CaptureEvent) {
        // No subscribers is fine.
        let _ = self.published.send(event);
    }

    fn transition(&self, state: &mut InputState, to: CaptureState) -> Result<(), SpeechError> {
        let from = state.capture;
        if !transition_allowed(from, to) {
            return Err(SpeechError::CaptureStateTransition { from, to });
        }
        debug!(session = %state.session_id, ?from, ?to, "Capture state changed");
        state.capture = to;
        self.publish(CaptureEvent::StateChanged {
            session_id: state.session_id,
            from,
            to,
        });
        Ok(())
    }

    /// Listening -> Stopped -> Idle.
    fn end_listening(&self, state: &mut InputState) {
        if self.transition(state, CaptureState::Stopped).is_ok() {
            let _ = self.transition(state, CaptureState::Idle);
        }
    }

    /// Move to Error and straight back to Idle, recording `error`.
    fn fail(&self, state: &mut InputState, error: SpeechError) {
        warn!(session = %state.session_id, error = %error, "Capture failed");
        if self.transition(state, CaptureState::Error).is_ok() {
            let _ = self.transition(state, CaptureState::Idle);
        }
        if let Some(message) = error.user_message() {
            self.publish(CaptureEvent::Error {
                session_id: state.session_id,
                message: message.to_string(),
            });
        }
        state.last_error = Some(error);
    }

    fn handler(&self) -> RecognizerEventHandler {
        let events = self.events.clone();
        Arc::new(move |session_id, event| {
            let _ = events.send((session_id, event));
        })
    }

    async fn start_recognizer(&self, session_id: SessionId, language: &str) -> Result<(), SpeechError> {
        let options = RecognizerOptions {
            language: language.to_string(),
            continuous: self.recognition.continuous,
            interim_results: self.recognition.interim_results,
        };

        match self.recognizer.start(session_id, options, self.handler()).await {
            Ok(()) => {
                // Capture may have been stopped while the recognizer was
                // starting. A newer listening session owns the recognizer.
                let unowned = self.state.lock().capture != CaptureState::Listening;
                if unowned {
                    info!(session = %session_id, "Capture ended while the recognizer was starting, stopping it");
                    self.audio_session.mark_capture_stopped();
                    if let Err(e) = self.recognizer.stop().await {
                        debug!(error = %e, "Recognizer stop failed");
                    }
                }
                Ok(())
            }
            Err(e) => {
                let mut state = self.state.lock();
                if state.session_id == session_id && state.capture == CaptureState::Listening {
                    self.fail(&mut state, e.clone());
                    drop(state);
                    self.audio_session.mark_capture_stopped();
                }
                Err(e)
            }
        }
    }

    async fn dispatch(&self, session_id: SessionId, event: RecognizerEvent) {
        let restart = {
            let mut state = self.state.lock();
            if state.session_id != session_id || state.capture != CaptureState::Listening {
                debug!(event_session = %session_id, current = %state.session_id, ?event, "Dropping capture event");
                return;
            }

            match event {
                RecognizerEvent::Started => {
                    debug!(session = %session_id, "Recognizer running");
                    None
                }
                RecognizerEvent::Result(batch) => {
                    state.transcript.current_session_text = reconcile(&batch);
                    self.publish(CaptureEvent::Transcript {
                        session_id,
                        text: state.transcript.visible(),
                    });
                    None
                }
                RecognizerEvent::Error(code) => match code.to_speech_error() {
                    None => {
                        debug!(session = %session_id, "Recognizer aborted");
                        None
                    }
                    Some(SpeechError::NoSpeechDetected) => {
                        debug!(session = %session_id, "No speech detected, still listening");
                        None
                    }
                    Some(_) if state.stopping_intentionally => None,
                    Some(error) => {
                        self.fail(&mut state, error);
                        Some(false)
                    }
                },
                RecognizerEvent::Ended => {
                    if state.stopping_intentionally {
                        None
                    } else if self.restart_on_silence {
                        state.transcript.carry_over();
                        info!(session = %session_id, "Recognizer ended on silence, restarting");
                        self.publish(CaptureEvent::Restarted { session_id });
                        self.publish(CaptureEvent::Transcript {
                            session_id,
                            text: state.transcript.visible(),
                        });
                        Some(true)
                    } else {
                        info!(session = %session_id, "Recognizer ended");
                        self.end_listening(&mut state);
                        Some(false)
                    }
                }
            }
        };

        match restart {
            Some(true) => {
                let language = self.state.lock().language.clone();
                // Failures are recorded by start_recognizer.
                let _ = self.start_recognizer(session_id, &language).await;
            }
            Some(false) => {
                self.audio_session.mark_capture_stopped();
                if let Err(e) = self.recognizer.stop().await {
                    debug!(error = %e, "Recognizer stop failed");
                }
            }
            None => {}
        }
    }
}
