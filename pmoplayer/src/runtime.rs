//! Coordinating task around a [`Session`].
//!
//! The session is moved into one task that multiplexes caller inputs and
//! adapter events with `tokio::select!`. Callers talk to it through a
//! cloneable [`SessionHandle`]; observers read snapshots from a `watch`
//! channel and notices from the event bus.

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::events::{MediaEvent, SessionEventBus, SessionNotice};
use crate::model::{CastState, SessionDescriptor};
use crate::session::{Command, Session, SessionSnapshot};

/// Inputs accepted by the session task.
#[derive(Debug)]
pub enum SessionInput {
    Activate(SessionDescriptor),
    End,
    Command(Command, oneshot::Sender<Result<()>>),
    Media(MediaEvent),
    CastState(CastState),
    LoadSubtitle {
        label: String,
        language: String,
        text: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

#[derive(Clone)]
pub struct SessionHandle {
    inputs: mpsc::UnboundedSender<SessionInput>,
    snapshots: watch::Receiver<SessionSnapshot>,
    bus: SessionEventBus,
}

impl SessionHandle {
    pub fn activate(&self, descriptor: SessionDescriptor) -> Result<()> {
        self.send(SessionInput::Activate(descriptor))
    }

    pub fn end(&self) -> Result<()> {
        self.send(SessionInput::End)
    }

    pub async fn dispatch(&self, command: Command) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionInput::Command(command, reply))?;
        rx.await.map_err(|_| closed())?
    }

    /// Forwards a media element callback.
    pub fn media_event(&self, event: MediaEvent) -> Result<()> {
        self.send(SessionInput::Media(event))
    }

    pub fn cast_state_changed(&self, state: CastState) -> Result<()> {
        self.send(SessionInput::CastState(state))
    }

    pub async fn load_subtitle(&self, label: &str, language: &str, text: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionInput::LoadSubtitle {
            label: label.to_string(),
            language: language.to_string(),
            text: text.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| closed())?
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(SessionInput::Shutdown)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    pub fn subscribe(&self) -> crossbeam_channel::Receiver<SessionNotice> {
        self.bus.subscribe()
    }

    /// Waits until a snapshot satisfies `predicate`.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<SessionSnapshot>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut rx = self.snapshots.clone();
        let snapshot = rx.wait_for(|s| predicate(s)).await.map_err(|_| closed())?;
        Ok(snapshot.clone())
    }

    fn send(&self, input: SessionInput) -> Result<()> {
        self.inputs.send(input).map_err(|_| closed())
    }
}

fn closed() -> Error {
    Error::unavailable("Playback session")
}

/// Moves `session` into its own task and returns a handle to it.
pub fn spawn_session(mut session: Session) -> SessionHandle {
    let (tx, mut inputs) = mpsc::unbounded_channel();
    let handle = SessionHandle {
        inputs: tx,
        snapshots: session.watch(),
        bus: session.event_bus(),
    };
    let Some(mut envelopes) = session.detach_receiver() else {
        // Receiver already consumed: the handle reports a closed session.
        return handle;
    };

    tokio::spawn(async move {
        info!("Session task started");
        loop {
            tokio::select! {
                input = inputs.recv() => {
                    match input {
                        Some(SessionInput::Activate(descriptor)) => session.activate(descriptor),
                        Some(SessionInput::End) => session.end(),
                        Some(SessionInput::Command(command, reply)) => {
                            let _ = reply.send(session.dispatch(command));
                        }
                        Some(SessionInput::Media(event)) => session.media_event(event),
                        Some(SessionInput::CastState(state)) => session.cast_state_changed(state),
                        Some(SessionInput::LoadSubtitle { label, language, text, reply }) => {
                            let _ = reply.send(session.load_subtitle(&label, &language, &text));
                        }
                        Some(SessionInput::Shutdown) | None => break,
                    }
                }
                Some(envelope) = envelopes.recv() => session.handle_envelope(envelope),
            }
        }
        session.end();
        debug!("Session task stopped");
    });

    handle
}
