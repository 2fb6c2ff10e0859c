use crate::message::Message;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Streaming,
    Finalizing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The user asked to send the text in the input box.
    Submit(String),
    /// A decoded piece of the response body.
    Segment(String),
    StreamEnded,
    StreamFailed(String),
    /// Commit the draft and return to idle.
    Finalize,
}

/// Work the owner of a [`Session`] must carry out after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// POST this history to the relay and stream the reply back as segments.
    Send(Vec<Message>),
    /// Feed [`Event::Finalize`] back into the session.
    Finalize,
}

/// Conversation history plus the assistant reply under construction.
///
/// At most one draft exists at a time: `Submit` is ignored unless the session
/// is [`Phase::Idle`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    history: Vec<Message>,
    draft: String,
    phase: Phase,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_busy(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// The draft as it should be shown while a reply is in progress.
    pub fn visible_draft(&self) -> Option<&str> {
        if self.is_busy() && !self.draft.is_empty() {
            Some(&self.draft)
        } else {
            None
        }
    }

    pub fn apply(&mut self, event: Event) -> Option<Effect> {
        let (next, effect) = step(std::mem::take(self), event);
        *self = next;
        effect
    }
}

pub fn step(mut session: Session, event: Event) -> (Session, Option<Effect>) {
    let effect = match (session.phase, event) {
        (Phase::Idle, Event::Submit(text)) if !text.is_empty() => {
            session.history.push(Message::user(text));
            session.draft.clear();
            session.phase = Phase::Streaming;
            Some(Effect::Send(session.history.clone()))
        }
        (Phase::Streaming, Event::Segment(text)) => {
            session.draft.push_str(&text);
            None
        }
        (Phase::Streaming, Event::StreamEnded | Event::StreamFailed(_)) => {
            session.phase = Phase::Finalizing;
            Some(Effect::Finalize)
        }
        (Phase::Finalizing, Event::Finalize) => {
            let draft = std::mem::take(&mut session.draft);
            if !draft.is_empty() {
                session.history.push(Message::assistant(draft));
            }
            session.phase = Phase::Idle;
            None
        }
        _ => None,
    };
    (session, effect)
}
