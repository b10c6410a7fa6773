use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use fred_core::Intent;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    Start,
    ClassifyIntent,
    RouteChatbot,
    RouteOther,
    RouteDatabase,
    Respond,
    End,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::ClassifyIntent => "classify_intent",
            Self::RouteChatbot => "route_chatbot",
            Self::RouteOther => "route_other",
            Self::RouteDatabase => "route_database",
            Self::Respond => "respond",
            Self::End => "end",
        }
    }

    pub fn route_for(intent: Intent) -> Self {
        match intent {
            Intent::Database => Self::RouteDatabase,
            Intent::Chatbot => Self::RouteChatbot,
            Intent::Other => Self::RouteOther,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunEvent {
    HistoryLoaded,
    Classified(Intent),
    Answered,
    HistoryRecorded,
    Abandoned,
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("invalid transition from {state:?} using event {event:?}")]
pub struct GraphTransitionError {
    pub state: RunState,
    pub event: RunEvent,
}

/// Transition table for one chat run:
/// `Start -> ClassifyIntent -> Route* -> Respond -> End`.
pub fn transition(current: RunState, event: RunEvent) -> Result<RunState, GraphTransitionError> {
    use RunEvent::{Abandoned, Answered, Classified, HistoryLoaded, HistoryRecorded};
    use RunState::{
        ClassifyIntent, End, Respond, RouteChatbot, RouteDatabase, RouteOther, Start,
    };

    let next = match (current, event) {
        (Start, HistoryLoaded) => ClassifyIntent,
        (ClassifyIntent, Classified(intent)) => RunState::route_for(intent),
        (RouteChatbot, Answered) | (RouteOther, Answered) | (RouteDatabase, Answered) => Respond,
        (Respond, HistoryRecorded) => End,
        (End, Abandoned) => {
            return Err(GraphTransitionError { state: current, event });
        }
        (_, Abandoned) => End,
        _ => return Err(GraphTransitionError { state: current, event }),
    };

    Ok(next)
}
