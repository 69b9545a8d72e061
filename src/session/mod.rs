// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The session actor (§4.3, §5): owns the UDP socket, the Scheduler,
//! the Router/Reassembler and the Roster Engine behind a single
//! `tokio::select!` loop, the way the teacher's `ClientConnection`
//! owns its TCP halves — except here one task does everything, since
//! §5 requires a single logical thread of state mutation and UDP has
//! no read/write halves to split a `Mutex` across.

pub mod state;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio::{
    net::UdpSocket,
    sync::{broadcast, mpsc, oneshot},
    time::{Instant, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    cfg::config::BeClientConfig,
    codec::{self, Frame},
    error::BeError,
    events::Event,
    roster::{Player, RosterEngine},
    router::{Router, RouterOutcome},
    scheduler::{CommandKind, Scheduler, SchedulerTick},
    session::state::SessionState,
};

const RECONNECT_BACKOFF: Duration = Duration::from_secs(3);
const TICK_PERIOD: Duration = Duration::from_secs(1);
/// Max UDP datagram this crate will ever receive; BE replies are small.
const RECV_BUF_LEN: usize = 64 * 1024;

enum ActorMessage {
    Connect(oneshot::Sender<bool>),
    Close {
        reason: Option<String>,
        abort_reconnect: Option<bool>,
        reply: oneshot::Sender<bool>,
    },
    SendCommand(String),
    Players(oneshot::Sender<Vec<Player>>),
}

/// Cloneable public handle (analogous to the teacher's `Arc<ClientConnection>`):
/// every clone talks to the same single-task actor via an mpsc mailbox.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<ActorMessage>,
    events: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Spawn the session actor and return a handle to it. Does not
    /// connect; call [`SessionHandle::connect`] to begin the login
    /// handshake.
    pub fn new(cfg: BeClientConfig) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(256);
        let cancel = CancellationToken::new();

        let actor = Session::new(cfg, commands_rx, events_tx.clone(), cancel.clone());
        tokio::spawn(actor.run());

        Self {
            commands: commands_tx,
            events: events_tx,
            cancel,
        }
    }

    /// Subscribe to the event stream (§6).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// `true` if the session transitioned out of `Closed`.
    pub async fn connect(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(ActorMessage::Connect(tx)).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn close(&self, reason: Option<String>, abort_reconnect: Option<bool>) -> bool {
        let (tx, rx) = oneshot::channel();
        let sent = self
            .commands
            .send(ActorMessage::Close {
                reason,
                abort_reconnect,
                reply: tx,
            })
            .is_ok();
        if !sent {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub fn send_command(&self, text: impl Into<String>) {
        let _ = self.commands.send(ActorMessage::SendCommand(text.into()));
    }

    pub async fn players(&self) -> Vec<Player> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(ActorMessage::Players(tx)).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Tear down the actor task itself, distinct from [`SessionHandle::close`]:
    /// `close` ends one connection and may still reconnect, this ends the
    /// actor for good. Idempotent.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

struct Session {
    cfg: BeClientConfig,
    state: SessionState,
    socket: Option<Arc<UdpSocket>>,
    scheduler: Scheduler,
    router: Router,
    roster: RosterEngine,
    auto_reconnect: bool,
    abort_reconnect: bool,
    last_inbound: Instant,
    last_outbound: Instant,
    login_deadline_at: Option<Instant>,
    reconnect_at: Option<Instant>,
    last_roster_poll_at: Option<Instant>,

    commands: mpsc::UnboundedReceiver<ActorMessage>,
    events: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl Session {
    fn new(
        cfg: BeClientConfig,
        commands: mpsc::UnboundedReceiver<ActorMessage>,
        events: broadcast::Sender<Event>,
        cancel: CancellationToken,
    ) -> Self {
        let scheduler = Scheduler::new(
            cfg.resend_interval(),
            cfg.part_quiet_interval(),
            cfg.max_attempts,
        );
        let auto_reconnect = cfg.auto_reconnect;
        Self {
            cfg,
            state: SessionState::Closed,
            socket: None,
            scheduler,
            router: Router::new(),
            roster: RosterEngine::new(),
            auto_reconnect,
            abort_reconnect: false,
            last_inbound: Instant::now(),
            last_outbound: Instant::now(),
            login_deadline_at: None,
            reconnect_at: None,
            last_roster_poll_at: None,
            commands,
            events,
            cancel,
        }
    }

    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }

    fn emit_error(&self, err: &BeError) {
        let _ = self.events.send(Event::from_error(err));
    }

    async fn bind_and_send_login(&mut self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.cfg.host, self.cfg.port)
            .parse()
            .context("invalid host/port")?;
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(addr).await?;
        let wire = codec::encode_login(&self.cfg.password);
        socket.send(&wire).await?;
        self.socket = Some(Arc::new(socket));
        self.login_deadline_at = Some(Instant::now() + self.cfg.login_deadline());
        self.last_inbound = Instant::now();
        self.last_outbound = Instant::now();
        Ok(())
    }

    async fn do_connect(&mut self) -> bool {
        if !self.state.is_closed() {
            return false;
        }
        self.reset_volatile_state();
        self.state = SessionState::Connecting;
        if let Err(e) = self.bind_and_send_login().await {
            warn!("failed to start connection: {e}");
            self.emit_error(&BeError::Transport(e.to_string()));
            self.begin_close("transport error".to_string(), false);
            return false;
        }
        self.state = SessionState::Authenticating;
        true
    }

    fn reset_volatile_state(&mut self) {
        self.scheduler = Scheduler::new(
            self.cfg.resend_interval(),
            self.cfg.part_quiet_interval(),
            self.cfg.max_attempts,
        );
        self.router.clear();
        self.roster.clear();
        self.login_deadline_at = None;
        self.last_roster_poll_at = None;
    }

    fn begin_close(&mut self, reason: String, abort_reconnect: bool) {
        if matches!(self.state, SessionState::Closed | SessionState::Closing) {
            return;
        }
        self.state = SessionState::Closing;
        self.socket = None;
        if abort_reconnect {
            self.abort_reconnect = true;
        }
        let should_reconnect = self.auto_reconnect && !self.abort_reconnect;
        self.emit(Event::Disconnected {
            reason,
            aborted: !should_reconnect,
        });
        self.state = SessionState::Closed;
        if should_reconnect {
            self.reconnect_at = Some(Instant::now() + RECONNECT_BACKOFF);
        }
    }

    async fn handle_command(&mut self, msg: ActorMessage) {
        match msg {
            ActorMessage::Connect(reply) => {
                let ok = self.do_connect().await;
                let _ = reply.send(ok);
            },
            ActorMessage::Close {
                reason,
                abort_reconnect,
                reply,
            } => {
                let was_open = !self.state.is_closed();
                let abort = abort_reconnect.unwrap_or(!self.auto_reconnect);
                self.begin_close(reason.unwrap_or_else(|| "closed by caller".to_string()), abort);
                let _ = reply.send(was_open);
            },
            ActorMessage::SendCommand(text) => {
                if self.state.is_connected() {
                    self.scheduler.enqueue_user(text.into_bytes());
                }
            },
            ActorMessage::Players(reply) => {
                let _ = reply.send(self.roster.players_snapshot());
            },
        }
    }

    async fn send_wire(&mut self, wire: &[u8]) {
        if let Some(socket) = &self.socket {
            match socket.send(wire).await {
                Ok(_) => self.last_outbound = Instant::now(),
                Err(e) => warn!("send failed: {e}"),
            }
        }
    }

    async fn handle_frame(&mut self, frame: Frame) {
        let now = Instant::now();
        self.last_inbound = now;

        match frame {
            Frame::Login(true) if self.state == SessionState::Authenticating => {
                self.state = SessionState::Connected;
                self.login_deadline_at = None;
                info!("login accepted");
                self.emit(Event::Connected);
                self.scheduler.enqueue_roster_poll();
                self.last_roster_poll_at = Some(now);
            },
            Frame::Login(false) if self.state == SessionState::Authenticating => {
                self.emit_error(&BeError::Auth);
                self.begin_close("Invalid password".to_string(), true);
            },
            Frame::Login(_) => {},
            other => self.route_post_login(other, now).await,
        }
    }

    async fn route_post_login(&mut self, frame: Frame, now: Instant) {
        if !self.state.accepts_frames() {
            return;
        }
        let in_flight = self.scheduler.in_flight_seq();
        let outcome = self.router.route(frame, |seq| Some(seq) == in_flight);

        match outcome {
            RouterOutcome::Login(_) => {},
            RouterOutcome::Ignored => {},
            RouterOutcome::PartBuffered { seq } => {
                self.scheduler.note_part_received(seq, now);
            },
            RouterOutcome::CommandReply { seq, data } => {
                if let Some(kind) = self.scheduler.retire(seq) {
                    self.deliver_command_reply(seq, kind, data);
                }
            },
            RouterOutcome::ServerMessage { data, ack } => {
                self.send_wire(&ack).await;
                if self.state.is_connected() {
                    self.handle_server_message(&data);
                }
            },
            RouterOutcome::DuplicateServerMessage { ack } => {
                self.send_wire(&ack).await;
            },
        }
    }

    fn deliver_command_reply(&mut self, seq: u8, kind: CommandKind, data: bytes::Bytes) {
        match kind {
            CommandKind::RosterPoll => {
                let body = String::from_utf8_lossy(&data).into_owned();
                for change in self.roster.handle_dump(&body) {
                    self.emit(change.into());
                }
            },
            CommandKind::Heartbeat => {},
            CommandKind::User => {
                self.emit(Event::CommandResponse {
                    sequence: seq,
                    data: data.to_vec(),
                });
            },
        }
    }

    fn handle_server_message(&mut self, data: &[u8]) {
        let line = String::from_utf8_lossy(data);
        for change in self.roster.handle_inline(&line) {
            self.emit(change.into());
        }
    }

    async fn on_tick(&mut self, now: Instant) {
        self.router.reassembler_mut().gc(now);

        if let Some(deadline) = self.login_deadline_at
            && now >= deadline
            && self.state == SessionState::Authenticating
        {
            self.emit_error(&BeError::LoginTimeout);
            self.begin_close("login timed out".to_string(), false);
            return;
        }

        if self.state.is_connected() && now.saturating_duration_since(self.last_inbound) >= self.cfg.idle_timeout() {
            self.emit_error(&BeError::IdleTimeout);
            self.begin_close("idle timeout".to_string(), false);
            return;
        }

        if self.state.is_connected()
            && now.saturating_duration_since(self.last_outbound) >= self.cfg.heartbeat_idle()
            && self.scheduler.queue_len() == 0
            && self.scheduler.in_flight_seq().is_none()
        {
            self.scheduler.enqueue_heartbeat();
        }

        if self.state.is_connected()
            && self
                .last_roster_poll_at
                .is_none_or(|at| now.saturating_duration_since(at) >= self.cfg.player_update_interval())
        {
            self.scheduler.enqueue_roster_poll();
            self.last_roster_poll_at = Some(now);
        }

        if !self.state.is_connected() {
            return;
        }

        match self.scheduler.tick(now) {
            Some(SchedulerTick::Send { seq, payload, .. }) => {
                // The previous occupant of this sequence slot may have
                // left a stale partial reassembly behind; drop it before
                // this new command's own parts start arriving (§4.4).
                self.router.reassembler_mut().drop_seq(seq);
                let wire = codec::encode_command(seq, &payload);
                self.send_wire(&wire).await;
            },
            Some(SchedulerTick::Resend { seq, payload, .. }) => {
                let wire = codec::encode_command(seq, &payload);
                self.send_wire(&wire).await;
            },
            Some(SchedulerTick::GiveUp { .. }) => {
                self.emit_error(&BeError::CommandTimeout);
                self.begin_close("command timed out".to_string(), false);
            },
            None => {},
        }
    }

    async fn run(mut self) {
        let mut ticker = interval(TICK_PERIOD);
        let mut recv_buf = vec![0u8; RECV_BUF_LEN];

        loop {
            let socket = self.socket.clone();
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("session actor cancelled");
                    return;
                },
                msg = self.commands.recv() => {
                    match msg {
                        Some(msg) => self.handle_command(msg).await,
                        None => return,
                    }
                },
                _ = ticker.tick() => {
                    let now = Instant::now();
                    self.on_tick(now).await;
                    if self.reconnect_due(now) {
                        let _ = self.do_connect().await;
                    }
                },
                recv = Self::recv_from(&socket, &mut recv_buf), if socket.is_some() => {
                    match recv {
                        Ok(n) => {
                            match codec::decode(&recv_buf[..n]) {
                                Ok(frame) => self.handle_frame(frame).await,
                                Err(e) => self.emit_error(&BeError::from(e)),
                            }
                        },
                        Err(e) => {
                            warn!("socket recv failed: {e}");
                            self.emit_error(&BeError::Transport(e.to_string()));
                            self.begin_close("transport error".to_string(), false);
                        },
                    }
                },
            }
        }
    }

    fn reconnect_due(&mut self, now: Instant) -> bool {
        match self.reconnect_at {
            Some(at) if now >= at => {
                self.reconnect_at = None;
                true
            },
            _ => false,
        }
    }

    async fn recv_from(socket: &Option<Arc<UdpSocket>>, buf: &mut [u8]) -> std::io::Result<usize> {
        match socket {
            Some(socket) => socket.recv(buf).await,
            None => std::future::pending().await,
        }
    }
}
