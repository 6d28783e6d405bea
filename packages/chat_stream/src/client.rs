//! Per-view chat controller.
//!
//! A [`ChatClient`] owns one connection and one turn. All mutation happens on
//! a single actor task that receives commands from the handle, events from the
//! connection and timer ticks, so a fragment and a tick can never interleave
//! half-applied. The current state is published as a [`ChatSnapshot`] through a
//! `watch` channel after every change.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::accumulator::FragmentDiscipline;
use crate::connection::{Connection, ConnectionEvent, ConnectionState};
use crate::endpoint::Endpoint;
use crate::error::ChatError;
use crate::payload::{Mode, ModeChange, Payload, TurnInput, encode_turn};
use crate::timer::DEFAULT_TICK_INTERVAL;
use crate::transcript::{Transcript, TranscriptEntry};
use crate::turn::{Turn, TurnPhase};

const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Tunables for one client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Elapsed-time recompute cadence while a reply is streaming.
    pub tick_interval: Duration,
    pub discipline: FragmentDiscipline,
    pub initial_mode: Mode,
    pub command_capacity: usize,
    pub event_capacity: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            discipline: FragmentDiscipline::Delta,
            initial_mode: Mode::Generic,
            command_capacity: 32,
            event_capacity: 256,
        }
    }
}

/// Everything a UI needs to render the current view.
#[derive(Debug, Clone, Serialize)]
pub struct ChatSnapshot {
    pub connection: ConnectionState,
    pub phase: TurnPhase,
    pub turn_id: Option<Uuid>,
    pub reply: String,
    pub elapsed_seconds: f64,
    pub mode: Mode,
    pub transcript: Vec<TranscriptEntry>,
}

impl ChatSnapshot {
    fn initial(mode: Mode) -> Self {
        Self {
            connection: ConnectionState::Connecting,
            phase: TurnPhase::Idle,
            turn_id: None,
            reply: String::new(),
            elapsed_seconds: 0.0,
            mode,
            transcript: Vec::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Open
    }

    pub fn is_loading(&self) -> bool {
        self.phase.is_loading()
    }
}

enum Command {
    Send {
        payload: Payload,
        frame: String,
        respond_to: oneshot::Sender<()>,
    },
    ChangeMode {
        mode: Mode,
        respond_to: oneshot::Sender<()>,
    },
    Settle {
        respond_to: oneshot::Sender<()>,
    },
    Reset {
        respond_to: oneshot::Sender<()>,
    },
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}

/// Handle to the per-view chat actor.
///
/// Dropping the handle stops the actor and closes the connection.
pub struct ChatClient {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<ChatSnapshot>,
    task: JoinHandle<()>,
}

impl ChatClient {
    /// Open a fresh connection and start the actor. Returns immediately; the
    /// snapshot reports `Connecting` until the handshake completes.
    pub fn connect(endpoint: Endpoint, options: ClientOptions) -> Self {
        let (command_tx, command_rx) = mpsc::channel(options.command_capacity.max(1));
        let (event_tx, event_rx) = mpsc::channel(options.event_capacity.max(1));
        let (snapshot_tx, snapshot_rx) = watch::channel(ChatSnapshot::initial(options.initial_mode));

        info!(endpoint = %endpoint, "starting chat session");
        let connection = Connection::connect(&endpoint, event_tx);

        let actor = ChatActor {
            connection,
            commands: command_rx,
            events: event_rx,
            snapshot: snapshot_tx,
            turn: Turn::new(),
            transcript: Transcript::new(),
            mode: options.initial_mode,
            discipline: options.discipline,
            tick_interval: options.tick_interval.max(MIN_TICK_INTERVAL),
            connection_state: ConnectionState::Connecting,
        };
        let task = tokio::spawn(actor.run());

        Self {
            commands: command_tx,
            snapshot: snapshot_rx,
            task,
        }
    }

    /// Encode and send one user turn.
    ///
    /// Blank input is rejected and attachment read failures are returned
    /// before anything is sent. When the connection is not open the turn is
    /// dropped without error and no state changes.
    ///
    /// An input without an explicit mode is sent in the active mode, the one
    /// last set by [`change_mode`](Self::change_mode).
    pub async fn submit(&self, mut input: TurnInput) -> Result<(), ChatError> {
        if input.is_empty() {
            return Err(ChatError::EmptyTurn);
        }
        input.mode.get_or_insert_with(|| self.mode());
        let payload = encode_turn(input).await?;
        self.send(payload).await
    }

    /// Send an already-built payload as a new turn.
    ///
    /// Applies the same guards as [`submit`](Self::submit): something must be
    /// sent, and at most one of file and audio.
    pub async fn send(&self, payload: Payload) -> Result<(), ChatError> {
        if payload.is_empty() {
            return Err(ChatError::EmptyTurn);
        }
        if payload.file.is_some() && payload.audio.is_some() {
            return Err(ChatError::ConflictingAttachments);
        }
        let frame = payload.to_frame()?;
        self.request(|respond_to| Command::Send {
            payload,
            frame,
            respond_to,
        })
        .await
    }

    /// Switch the active mode and notify the server. Does not start a turn.
    pub async fn change_mode(&self, mode: Mode) -> Result<(), ChatError> {
        self.request(|respond_to| Command::ChangeMode { mode, respond_to })
            .await
    }

    /// Mark the current reply complete. The transport has no end-of-turn
    /// frame, so the consumer decides when this happens.
    pub async fn settle(&self) -> Result<(), ChatError> {
        self.request(|respond_to| Command::Settle { respond_to }).await
    }

    /// Clear reply, timer and loading state. Does not un-send anything.
    pub async fn reset(&self) -> Result<(), ChatError> {
        self.request(|respond_to| Command::Reset { respond_to }).await
    }

    /// Close the connection and stop the actor.
    pub async fn close(self) {
        let (tx, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::Shutdown { respond_to: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
        if let Err(e) = self.task.await {
            warn!(error = %e, "chat actor panicked");
        }
    }

    async fn request(
        &self,
        make: impl FnOnce(oneshot::Sender<()>) -> Command,
    ) -> Result<(), ChatError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| ChatError::SessionClosed)?;
        rx.await.map_err(|_| ChatError::SessionClosed)
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshot.clone()
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn reply(&self) -> String {
        self.snapshot.borrow().reply.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.snapshot.borrow().is_connected()
    }

    pub fn is_loading(&self) -> bool {
        self.snapshot.borrow().is_loading()
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.snapshot.borrow().elapsed_seconds
    }

    pub fn phase(&self) -> TurnPhase {
        self.snapshot.borrow().phase
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.snapshot.borrow().connection
    }

    pub fn mode(&self) -> Mode {
        self.snapshot.borrow().mode
    }

    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.snapshot.borrow().transcript.clone()
    }
}

struct ChatActor {
    connection: Connection,
    commands: mpsc::Receiver<Command>,
    events: mpsc::Receiver<ConnectionEvent>,
    snapshot: watch::Sender<ChatSnapshot>,
    turn: Turn,
    transcript: Transcript,
    mode: Mode,
    discipline: FragmentDiscipline,
    tick_interval: Duration,
    connection_state: ConnectionState,
}

impl ChatActor {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut events_open = true;

        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    if let Some(respond_to) = self.handle_command(cmd) {
                        self.connection.close().await;
                        self.connection_state = ConnectionState::Closed;
                        self.publish();
                        let _ = respond_to.send(());
                        debug!("chat actor stopped");
                        return;
                    }
                }
                event = self.events.recv(), if events_open => match event {
                    Some(event) => self.handle_event(event),
                    None => events_open = false,
                },
                _ = ticker.tick(), if self.turn.is_timing() => {
                    self.turn.tick(Instant::now());
                    self.publish();
                }
            }
        }

        // handle dropped
        self.connection.close().await;
        debug!("chat actor stopped");
    }

    /// Returns the responder when the command asks the actor to stop.
    fn handle_command(&mut self, cmd: Command) -> Option<oneshot::Sender<()>> {
        match cmd {
            Command::Send {
                payload,
                frame,
                respond_to,
            } => {
                if self.is_open() {
                    let turn_id = self.turn.begin();
                    // transcript first so the outgoing turn renders before the send
                    let attachment = payload.attachment_label();
                    self.transcript
                        .push_user(payload.message, attachment, payload.mode);
                    self.publish();
                    debug!(%turn_id, bytes = frame.len(), "sending turn");
                    if !self.connection.send(frame) {
                        debug!(%turn_id, "connection went away, turn not transmitted");
                    }
                } else {
                    debug!(state = ?self.connection_state, "not connected, dropping turn");
                }
                let _ = respond_to.send(());
            }
            Command::ChangeMode { mode, respond_to } => {
                self.mode = mode;
                self.publish();
                let frame = ModeChange { mode }.to_frame();
                match frame {
                    Ok(frame) if self.is_open() => {
                        if !self.connection.send(frame) {
                            debug!(%mode, "connection went away, mode change not transmitted");
                        }
                    }
                    Ok(_) => debug!(%mode, "not connected, dropping mode change"),
                    Err(e) => warn!(error = %e, "failed to encode mode change"),
                }
                let _ = respond_to.send(());
            }
            Command::Settle { respond_to } => {
                match self.turn.settle(Instant::now()) {
                    Ok(()) => self.publish(),
                    Err(e) => debug!(error = %e, "settle ignored"),
                }
                let _ = respond_to.send(());
            }
            Command::Reset { respond_to } => {
                self.turn.reset();
                self.publish();
                let _ = respond_to.send(());
            }
            Command::Shutdown { respond_to } => return Some(respond_to),
        }
        None
    }

    fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened => {
                self.connection_state = ConnectionState::Open;
                self.turn.reset();
            }
            ConnectionEvent::Fragment(fragment) => {
                let Some(delta) = self.discipline.to_delta(self.turn.reply(), fragment) else {
                    return;
                };
                self.turn.on_fragment(&delta, Instant::now());
                self.transcript.update_assistant(self.turn.reply());
            }
            ConnectionEvent::Closed { reason } => {
                self.connection_state = ConnectionState::Closed;
                if let Some(reason) = reason {
                    warn!(%reason, "chat connection lost");
                }
            }
        }
        self.publish();
    }

    /// Open as far as this actor has observed; a turn is never sent ahead of
    /// the `Opened` event that would reset it.
    fn is_open(&self) -> bool {
        self.connection_state == ConnectionState::Open && self.connection.is_open()
    }

    fn publish(&self) {
        self.snapshot.send_replace(ChatSnapshot {
            connection: self.connection_state,
            phase: self.turn.phase(),
            turn_id: self.turn.id(),
            reply: self.turn.reply().to_string(),
            elapsed_seconds: self.turn.elapsed_seconds(),
            mode: self.mode,
            transcript: self.transcript.entries().to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let o = ClientOptions::default();
        assert_eq!(o.tick_interval, Duration::from_millis(100));
        assert_eq!(o.discipline, FragmentDiscipline::Delta);
        assert_eq!(o.initial_mode, Mode::Generic);
    }

    #[test]
    fn initial_snapshot() {
        let s = ChatSnapshot::initial(Mode::PersonalQuery);
        assert!(!s.is_connected());
        assert!(!s.is_loading());
        assert_eq!(s.reply, "");
        assert_eq!(s.elapsed_seconds, 0.0);
        assert_eq!(s.mode, Mode::PersonalQuery);
    }

    #[tokio::test]
    async fn send_rejects_empty_payload() {
        let endpoint = Endpoint::new("ws://127.0.0.1:9/ws", "t").unwrap();
        let client = ChatClient::connect(endpoint, ClientOptions::default());
        let err = client
            .send(Payload::text(" ", Mode::Generic))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::EmptyTurn));
        assert_eq!(client.phase(), TurnPhase::Idle);
        client.close().await;
    }

    #[tokio::test]
    async fn send_rejects_file_and_audio_together() {
        use crate::payload::{AudioPayload, FilePayload};

        let endpoint = Endpoint::new("ws://127.0.0.1:9/ws", "t").unwrap();
        let client = ChatClient::connect(endpoint, ClientOptions::default());
        let mut payload = Payload::text("hi", Mode::Generic);
        payload.file = Some(FilePayload {
            name: "a.txt".into(),
            mime_type: "text/plain".into(),
            content: "eA==".into(),
        });
        payload.audio = Some(AudioPayload {
            mime_type: "audio/webm".into(),
            duration: 1.0,
            content: "eA==".into(),
        });
        let err = client.send(payload).await.unwrap_err();
        assert_eq!(err.error_code(), "conflicting_attachments");
        assert!(client.transcript().is_empty());
        client.close().await;
    }

    #[tokio::test]
    async fn empty_turn_is_rejected_before_anything_else() {
        let endpoint = Endpoint::new("ws://127.0.0.1:9/ws", "t").unwrap();
        let client = ChatClient::connect(endpoint, ClientOptions::default());
        let err = client.submit(TurnInput::new("  ")).await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyTurn));
        assert!(client.transcript().is_empty());
        client.close().await;
    }
}
