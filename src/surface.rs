//! Input surface state machine.
//!
//! Everything the surface shows is derived from [`SurfaceState`], and the only
//! way to change it is [`reduce`]. Side effects (notifying the caller, calling
//! the extractor, arming the success timer) come back as [`Effect`]s for the
//! session to run; their results re-enter as [`Event`]s.

use std::fmt;
use std::time::Duration;

use clap::ValueEnum;

use crate::concepts::{join_concepts, split_concepts};

pub const DEFAULT_SUCCESS_DELAY: Duration = Duration::from_secs(3);

pub const MISSING_INPUT_MESSAGE: &str = "Enter some text or load a file first.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum InputMode {
    /// One concept per line
    #[default]
    #[value(name = "manual")]
    Manual,
    /// Free-form text analysed by the AI extractor
    #[value(name = "ai")]
    AiExtract,
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => f.write_str("manual list"),
            Self::AiExtract => f.write_str("AI extraction"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Idle,
    Editing,
    Processing,
    Succeeded {
        message: String,
    },
    Failed {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    TextEdited(String),
    FileLoaded(String),
    ModeSelected(InputMode),
    ExtractRequested,
    ExtractionSucceeded { request: u64, concepts: Vec<String> },
    ExtractionFailed { request: u64, message: String },
    SuccessExpired { ticket: u64 },
    /// Buffer discarded; anything still in flight becomes stale.
    Cleared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    EmitConcepts(Vec<String>),
    StartExtraction { request: u64, text: String },
    ScheduleSuccessExpiry { ticket: u64, after: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceState {
    pub mode: InputMode,
    pub text: String,
    pub status: Status,
    pub concepts: Vec<String>,
    success_delay: Duration,
    in_flight: Option<u64>,
    next_request: u64,
    success_ticket: u64,
}

impl Default for SurfaceState {
    fn default() -> Self {
        Self::new(DEFAULT_SUCCESS_DELAY)
    }
}

impl SurfaceState {
    pub fn new(success_delay: Duration) -> Self {
        Self {
            mode: InputMode::default(),
            text: String::new(),
            status: Status::Idle,
            concepts: Vec::new(),
            success_delay,
            in_flight: None,
            next_request: 1,
            success_ticket: 0,
        }
    }

    pub fn with_mode(mut self, mode: InputMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn is_processing(&self) -> bool {
        matches!(self.status, Status::Processing)
    }

    /// Whether the extract control accepts a press.
    pub fn trigger_enabled(&self) -> bool {
        self.mode == InputMode::AiExtract && !self.is_processing() && !self.text.is_empty()
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            Status::Failed { message } => Some(message),
            _ => None,
        }
    }

    pub fn success_message(&self) -> Option<&str> {
        match &self.status {
            Status::Succeeded { message } => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: SurfaceState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn quiet(state: SurfaceState) -> Self {
        Self {
            state,
            effects: Vec::new(),
        }
    }
}

pub fn reduce(mut state: SurfaceState, event: Event) -> Transition {
    match event {
        Event::TextEdited(text) | Event::FileLoaded(text) => {
            state.text = text;
            if !state.is_processing() {
                state.status = Status::Editing;
            }

            let mut effects = Vec::new();
            if state.mode == InputMode::Manual {
                state.concepts = split_concepts(&state.text);
                effects.push(Effect::EmitConcepts(state.concepts.clone()));
            }
            Transition { state, effects }
        }
        Event::ModeSelected(mode) => {
            state.mode = mode;
            Transition::quiet(state)
        }
        Event::ExtractRequested => {
            if !state.trigger_enabled() {
                tracing::debug!("Ignoring extract request: control is disabled");
                return Transition::quiet(state);
            }

            if state.text.trim().is_empty() {
                state.status = Status::Failed {
                    message: MISSING_INPUT_MESSAGE.to_string(),
                };
                return Transition::quiet(state);
            }

            let request = state.next_request;
            state.next_request += 1;
            state.in_flight = Some(request);
            state.status = Status::Processing;

            let text = state.text.clone();
            Transition {
                state,
                effects: vec![Effect::StartExtraction { request, text }],
            }
        }
        Event::ExtractionSucceeded { request, concepts } => {
            if !state.take_in_flight(request) {
                return Transition::quiet(state);
            }

            state.text = join_concepts(&concepts);
            state.mode = InputMode::Manual;
            state.concepts = concepts;
            state.success_ticket += 1;
            state.status = Status::Succeeded {
                message: format!(
                    "Success! {} concepts found. Review the list below.",
                    state.concepts.len()
                ),
            };

            let effects = vec![
                Effect::EmitConcepts(state.concepts.clone()),
                Effect::ScheduleSuccessExpiry {
                    ticket: state.success_ticket,
                    after: state.success_delay,
                },
            ];
            Transition { state, effects }
        }
        Event::ExtractionFailed { request, message } => {
            if !state.take_in_flight(request) {
                return Transition::quiet(state);
            }

            state.status = Status::Failed {
                message: format!("Error: {message}. Check the deployment configuration and logs."),
            };
            Transition::quiet(state)
        }
        Event::SuccessExpired { ticket } => {
            if ticket == state.success_ticket && state.success_message().is_some() {
                state.status = Status::Idle;
            }
            Transition::quiet(state)
        }
        Event::Cleared => {
            if let Some(request) = state.in_flight.take() {
                tracing::debug!("Abandoning in-flight extraction request {}", request);
            }
            state.text.clear();
            state.status = Status::Idle;

            let mut effects = Vec::new();
            if !state.concepts.is_empty() {
                state.concepts.clear();
                effects.push(Effect::EmitConcepts(Vec::new()));
            }
            Transition { state, effects }
        }
    }
}

impl SurfaceState {
    fn take_in_flight(&mut self, request: u64) -> bool {
        if self.in_flight != Some(request) {
            tracing::debug!("Dropping stale result for extraction request {}", request);
            return false;
        }
        self.in_flight = None;
        true
    }
}
