use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::extract::ConceptExtractor;
use crate::surface::{Effect, Event, SurfaceState, Transition, reduce};

/// Runs the surface reducer against real effects.
///
/// Extraction requests and success timers run as spawned tasks and report
/// back over a channel, so results are applied in order on the caller's task.
pub struct Session<F>
where
    F: FnMut(&[String]),
{
    state: SurfaceState,
    extractor: Arc<dyn ConceptExtractor>,
    on_concepts_update: F,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
}

impl<F> Session<F>
where
    F: FnMut(&[String]),
{
    pub fn new(
        state: SurfaceState,
        extractor: Arc<dyn ConceptExtractor>,
        on_concepts_update: F,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            state,
            extractor,
            on_concepts_update,
            events_tx,
            events_rx,
        }
    }

    pub fn state(&self) -> &SurfaceState {
        &self.state
    }

    pub fn into_state(self) -> SurfaceState {
        self.state
    }

    pub fn dispatch(&mut self, event: Event) {
        let current = std::mem::take(&mut self.state);
        let Transition { state, effects } = reduce(current, event);
        self.state = state;

        for effect in effects {
            self.run(effect);
        }
    }

    /// Applies any events that already arrived, without waiting.
    pub fn drain_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.dispatch(event);
            applied += 1;
        }
        applied
    }

    /// Waits for the next asynchronous event and applies it.
    pub async fn next_event(&mut self) {
        if let Some(event) = self.events_rx.recv().await {
            self.dispatch(event);
        }
    }

    pub async fn wait_for_extraction(&mut self) {
        while self.state.is_processing() {
            self.next_event().await;
        }
    }

    fn run(&mut self, effect: Effect) {
        match effect {
            Effect::EmitConcepts(concepts) => (self.on_concepts_update)(&concepts),
            Effect::StartExtraction { request, text } => {
                let extractor = Arc::clone(&self.extractor);
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let event = match extractor.extract_concepts(&text).await {
                        Ok(concepts) => Event::ExtractionSucceeded { request, concepts },
                        Err(err) => {
                            tracing::warn!("AI extraction error: {}", err);
                            Event::ExtractionFailed {
                                request,
                                message: err.to_string(),
                            }
                        }
                    };
                    // A closed channel means the session is gone; nobody is left to tell.
                    let _ = events.send(event);
                });
            }
            Effect::ScheduleSuccessExpiry { ticket, after } => {
                let deadline = Instant::now() + after;
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep_until(deadline).await;
                    let _ = events.send(Event::SuccessExpired { ticket });
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::extract::{ExtractError, ExtractorConfig, GeminiClient};
    use crate::surface::{InputMode, MISSING_INPUT_MESSAGE, Status};

    enum Outcome {
        Concepts(Vec<&'static str>),
        MalformedJson,
    }

    struct StubExtractor {
        outcome: Outcome,
        calls: AtomicUsize,
    }

    impl StubExtractor {
        fn new(outcome: Outcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ConceptExtractor for StubExtractor {
        async fn extract_concepts(&self, _text: &str) -> Result<Vec<String>, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.outcome {
                Outcome::Concepts(concepts) => {
                    Ok(concepts.iter().map(|c| c.to_string()).collect())
                }
                Outcome::MalformedJson => Err(ExtractError::Parse(
                    serde_json::from_str::<serde_json::Value>("{\"concepts\":").unwrap_err(),
                )),
            }
        }
    }

    type Updates = Rc<RefCell<Vec<Vec<String>>>>;

    fn session(
        extractor: Arc<dyn ConceptExtractor>,
    ) -> (Session<impl FnMut(&[String])>, Updates) {
        let updates: Updates = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&updates);
        let session = Session::new(
            SurfaceState::new(Duration::from_secs(3)).with_mode(InputMode::AiExtract),
            extractor,
            move |concepts: &[String]| sink.borrow_mut().push(concepts.to_vec()),
        );
        (session, updates)
    }

    #[tokio::test]
    async fn extraction_updates_buffer_and_notifies_once() {
        let stub = StubExtractor::new(Outcome::Concepts(vec!["Appel", "Peer"]));
        let (mut session, updates) = session(stub.clone());

        session.dispatch(Event::TextEdited("Op de markt liggen appels en peren.".into()));
        session.dispatch(Event::ExtractRequested);
        assert!(session.state().is_processing());
        assert!(updates.borrow().is_empty());

        session.wait_for_extraction().await;

        let state = session.state();
        assert_eq!(state.text, "Appel\nPeer");
        assert_eq!(state.mode, InputMode::Manual);
        assert!(state.success_message().unwrap().contains('2'));
        assert_eq!(*updates.borrow(), vec![vec!["Appel", "Peer"]]);
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn whitespace_never_reaches_extractor() {
        let stub = StubExtractor::new(Outcome::Concepts(vec!["Appel"]));
        let (mut session, updates) = session(stub.clone());

        session.dispatch(Event::TextEdited("   \n ".into()));
        session.dispatch(Event::ExtractRequested);
        tokio::task::yield_now().await;
        session.drain_pending();

        assert_eq!(session.state().error(), Some(MISSING_INPUT_MESSAGE));
        assert_eq!(stub.calls(), 0);
        assert!(updates.borrow().is_empty());
    }

    #[tokio::test]
    async fn malformed_response_leaves_buffer_untouched() {
        let stub = StubExtractor::new(Outcome::MalformedJson);
        let (mut session, updates) = session(stub);

        session.dispatch(Event::TextEdited("Ruwe tekst".into()));
        session.dispatch(Event::ExtractRequested);
        session.wait_for_extraction().await;

        let state = session.state();
        assert_eq!(state.text, "Ruwe tekst");
        assert!(state.concepts.is_empty());
        assert!(state.error().unwrap().contains("failed to parse concepts JSON"));
        assert!(updates.borrow().is_empty());
    }

    #[tokio::test]
    async fn empty_extraction_reports_zero() {
        let stub = StubExtractor::new(Outcome::Concepts(vec![]));
        let (mut session, updates) = session(stub);

        session.dispatch(Event::TextEdited("Onzin".into()));
        session.dispatch(Event::ExtractRequested);
        session.wait_for_extraction().await;

        assert!(session.state().success_message().unwrap().contains(" 0 "));
        assert!(session.state().error().is_none());
        assert_eq!(*updates.borrow(), vec![Vec::<String>::new()]);
    }

    #[tokio::test]
    async fn missing_credential_surfaces_configuration_message() {
        let client = GeminiClient::new(ExtractorConfig {
            api_key: None,
            model: "gemini-2.5-flash".into(),
            base_url: "http://127.0.0.1:9/v1beta".into(),
            temperature: None,
        })
        .unwrap();
        let (mut session, _) = session(Arc::new(client));

        session.dispatch(Event::TextEdited("Tekst over kazen".into()));
        session.dispatch(Event::ExtractRequested);
        session.wait_for_extraction().await;

        let message = session.state().error().unwrap();
        assert!(message.contains("API key is missing"));
        assert!(session.state().trigger_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn success_message_expires_after_delay() {
        let stub = StubExtractor::new(Outcome::Concepts(vec!["Molen"]));
        let (mut session, _) = session(stub);

        session.dispatch(Event::TextEdited("Molens".into()));
        session.dispatch(Event::ExtractRequested);
        session.wait_for_extraction().await;
        let succeeded_at = Instant::now();

        tokio::time::advance(Duration::from_secs(2)).await;
        session.drain_pending();
        assert!(session.state().success_message().is_some());

        session.next_event().await;
        assert_eq!(session.state().status, Status::Idle);
        assert!(succeeded_at.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn edit_clears_success_before_timer() {
        let stub = StubExtractor::new(Outcome::Concepts(vec!["Molen"]));
        let (mut session, updates) = session(stub);

        session.dispatch(Event::TextEdited("Molens".into()));
        session.dispatch(Event::ExtractRequested);
        session.wait_for_extraction().await;

        session.dispatch(Event::TextEdited("Molen\nTulp".into()));
        assert_eq!(session.state().status, Status::Editing);

        session.next_event().await;
        assert_eq!(session.state().status, Status::Editing);
        assert_eq!(updates.borrow().last().unwrap(), &vec!["Molen", "Tulp"]);
    }
}
