use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use flate2::read::GzDecoder;
use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, Interval, interval_at, sleep, timeout};
use tokio_tungstenite::tungstenite::Message;

use crate::{
    config::{ListenerConfig, TimingConfig},
    error::{AuthError, ParseError, SessionError, TransportError},
    exchanges::adapter::{ExchangeAdapter, ParseResult, Subscription},
    metrics::{METRICS, incr},
    session::{SessionProvisioner, SessionToken},
    sink::EventSink,
};

use super::backoff::ReconnectPolicy;
use super::state::{ConnectionState, StateCell};
use super::transport::{Connector, WsTransport};

/// Static per-listener settings resolved from config.
#[derive(Debug, Clone)]
pub struct ListenerSettings {
    pub subscription: Subscription,

    /// Endpoint without the session token
    pub ws_url: String,

    pub timing: TimingConfig,

    pub raw_logging: bool,
}

impl ListenerSettings {
    pub fn from_config(cfg: &ListenerConfig, adapter: &dyn ExchangeAdapter, raw_logging: bool) -> Self {
        Self {
            subscription: cfg.subscription.clone(),
            ws_url: cfg
                .ws_url
                .clone()
                .unwrap_or_else(|| adapter.ws_url().to_string()),
            timing: cfg.timing.clone(),
            raw_logging,
        }
    }
}

/// Runs one exchange stream forever: connect, keep alive, normalize,
/// reconnect.
///
/// GUARANTEES:
/// - Exactly one connection attempt is scheduled per disconnect
/// - A held session token is revoked at most once, and never used
///   after its revoke started
/// - Parse and sink failures never end a session
///
/// The loop only returns after the shutdown signal.
pub struct Listener {
    adapter: Arc<dyn ExchangeAdapter>,
    provisioner: Option<Arc<dyn SessionProvisioner>>,
    connector: Arc<dyn Connector>,
    sink: Arc<dyn EventSink>,
    settings: ListenerSettings,
    state: StateCell,
}

/// State owned by one Connecting…Disconnected cycle.
#[derive(Default)]
struct Session {
    token: Option<SessionToken>,
}

enum SessionEnd {
    Disconnected(SessionError),
    Shutdown,
}

impl Listener {
    pub fn new(
        adapter: Arc<dyn ExchangeAdapter>,
        provisioner: Option<Arc<dyn SessionProvisioner>>,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn EventSink>,
        settings: ListenerSettings,
    ) -> Self {
        let state = StateCell::new(adapter.name());
        Self {
            adapter,
            provisioner,
            connector,
            sink,
            settings,
            state,
        }
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn name(&self) -> &'static str {
        self.adapter.name()
    }

    /// Reconnect controller.
    ///
    /// `shutdown` flipping to `true` (or its sender going away) moves
    /// the listener to Closing from whatever it is doing.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = ReconnectPolicy::from_timing(&self.settings.timing);
        incr(&METRICS.listeners_active);

        info!(
            "[{}] listener starting: {} {}",
            self.name(),
            self.settings.subscription.channel,
            self.settings.subscription.instrument
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.state.set(ConnectionState::Connecting);

            match self.run_session(&mut shutdown, &mut backoff).await {
                SessionEnd::Shutdown => break,
                SessionEnd::Disconnected(reason) => {
                    self.state.set(ConnectionState::Disconnected);
                    incr(&METRICS.ws_reconnects);

                    let delay = backoff.next_delay();
                    warn!(
                        "[{}] disconnected: {} – reconnecting in {:?}",
                        self.name(),
                        reason,
                        delay
                    );

                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = wait_for_shutdown(&mut shutdown) => break,
                    }
                }
            }
        }

        self.state.set(ConnectionState::Closing);
        METRICS.listeners_active.fetch_sub(1, Ordering::Relaxed);
        info!("[{}] listener stopped", self.name());
    }

    /// One Connecting…Disconnected cycle.
    async fn run_session(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        backoff: &mut ReconnectPolicy,
    ) -> SessionEnd {
        let mut session = Session::default();

        // Not raced against shutdown: a key the server already created
        // must come back to us so teardown can revoke it.
        if let Err(e) = self.acquire_token(&mut session).await {
            error!("[{}] session token request failed: {}", self.name(), e);
            return SessionEnd::Disconnected(e.into());
        }

        let opened = tokio::select! {
            res = self.open(&session) => res,
            _ = wait_for_shutdown(shutdown) => {
                self.state.set(ConnectionState::Closing);
                self.teardown(&mut session, None).await;
                return SessionEnd::Shutdown;
            }
        };

        let mut transport = match opened {
            Ok(t) => t,
            Err(e) => {
                error!("[{}] connect failed: {}", self.name(), e);
                self.teardown(&mut session, None).await;
                return SessionEnd::Disconnected(e);
            }
        };

        self.state.set(ConnectionState::Connected);
        backoff.reset();
        incr(&METRICS.ws_connections_active);
        let connected_at = Instant::now();
        info!("[{}] connected", self.name());

        let end = self.drive(transport.as_mut(), &mut session, shutdown).await;

        if matches!(end, SessionEnd::Shutdown) {
            self.state.set(ConnectionState::Closing);
        }

        info!(
            "[{}] session ended after {}s",
            self.name(),
            connected_at.elapsed().as_secs()
        );
        self.teardown(&mut session, Some(transport.as_mut())).await;
        METRICS
            .ws_connections_active
            .fetch_sub(1, Ordering::Relaxed);

        end
    }

    /// Acquires a session token if the exchange needs one and none is
    /// held. Bounded by the provisioner's own request timeout.
    async fn acquire_token(&self, session: &mut Session) -> Result<(), AuthError> {
        let Some(provisioner) = &self.provisioner else {
            return Ok(());
        };
        if session.token.is_none() {
            let token = provisioner.acquire().await?;
            incr(&METRICS.tokens_acquired);
            session.token = Some(token);
        }
        Ok(())
    }

    /// Dial → subscribe.
    ///
    /// The token stays in `session`; the caller's teardown revokes it
    /// when this fails or is cancelled.
    async fn open(&self, session: &Session) -> Result<Box<dyn WsTransport>, SessionError> {
        let url = self
            .adapter
            .stream_url(&self.settings.ws_url, session.token.as_ref());
        info!("[{}] connecting to {}", self.name(), self.settings.ws_url);

        let connect_timeout = self.settings.timing.connect_timeout();
        let mut transport = timeout(connect_timeout, self.connector.connect(&url))
            .await
            .map_err(|_| TransportError::ConnectTimeout(connect_timeout.as_secs()))??;

        if let Some(sub) = self
            .adapter
            .build_subscribe_message(&self.settings.subscription)
        {
            transport.send(Message::text(sub.to_string())).await?;
            info!(
                "[{}] subscribe sent: {}",
                self.name(),
                self.settings.subscription.channel
            );
        }

        Ok(transport)
    }

    /// Event loop of a Connected session.
    ///
    /// Timers live here and die with the session:
    /// - heartbeat: transport ping + silence check
    /// - app ping: exchange-level JSON ping (if the adapter has one)
    /// - renewal: session token keep-alive (if a token is held)
    async fn drive(
        &self,
        transport: &mut dyn WsTransport,
        session: &mut Session,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let timing = &self.settings.timing;
        let start = Instant::now();

        let mut heartbeat = interval_at(start + timing.heartbeat_interval(), timing.heartbeat_interval());
        let mut app_ping = self
            .adapter
            .build_app_ping()
            .map(|_| interval_at(start + timing.app_ping_interval(), timing.app_ping_interval()));
        let mut renewal = session
            .token
            .as_ref()
            .map(|_| interval_at(start + timing.renew_interval(), timing.renew_interval()));

        let mut pending_renewal: Option<JoinHandle<Result<SessionToken, AuthError>>> = None;
        let mut last_seen = start;

        let end = loop {
            tokio::select! {
                _ = wait_for_shutdown(shutdown) => break SessionEnd::Shutdown,

                frame = transport.next_frame() => match frame {
                    Some(Ok(msg)) => {
                        last_seen = Instant::now();
                        if let Err(e) = self.on_frame(transport, msg).await {
                            break SessionEnd::Disconnected(e.into());
                        }
                    }
                    Some(Err(e)) => break SessionEnd::Disconnected(e.into()),
                    None => break SessionEnd::Disconnected(TransportError::StreamEnded.into()),
                },

                _ = heartbeat.tick() => {
                    if let Some(limit) = timing.pong_timeout() {
                        if last_seen.elapsed() >= limit {
                            incr(&METRICS.pong_timeouts);
                            break SessionEnd::Disconnected(
                                TransportError::PongTimeout(limit.as_secs()).into(),
                            );
                        }
                    }

                    debug!("[{}] heartbeat ping", self.name());
                    if let Err(e) = transport.send(Message::Ping(Vec::new().into())).await {
                        break SessionEnd::Disconnected(e.into());
                    }
                    incr(&METRICS.pings_sent);
                },

                _ = tick_opt(&mut app_ping) => {
                    if let Some(ping) = self.adapter.build_app_ping() {
                        if let Err(e) = transport.send(Message::text(ping.to_string())).await {
                            break SessionEnd::Disconnected(e.into());
                        }
                    }
                },

                _ = tick_opt(&mut renewal) => {
                    if pending_renewal.is_some() {
                        warn!("[{}] previous renewal still running, skipping tick", self.name());
                    } else if let (Some(provisioner), Some(token)) = (&self.provisioner, &session.token) {
                        info!("[{}] renewing session token {}", self.name(), token.redacted());
                        let provisioner = provisioner.clone();
                        let token = token.duplicate();
                        pending_renewal = Some(tokio::spawn(async move {
                            provisioner.renew(&token).await
                        }));
                    }
                },

                res = join_opt(&mut pending_renewal) => match res {
                    Ok(Ok(token)) => {
                        incr(&METRICS.tokens_renewed);
                        info!("[{}] session token renewed", self.name());
                        session.token = Some(token);
                    }
                    Ok(Err(e)) => {
                        incr(&METRICS.renew_failures);
                        break SessionEnd::Disconnected(e.into());
                    }
                    Err(e) => {
                        incr(&METRICS.renew_failures);
                        break SessionEnd::Disconnected(AuthError::Request(e.to_string()).into());
                    }
                },
            }
        };

        // The renewal task must be gone before the token is revoked.
        if let Some(handle) = pending_renewal.take() {
            handle.abort();
            let _ = handle.await;
        }

        end
    }

    /// Connected → Connected self-loop. Errors returned here are
    /// transport failures; everything else is contained.
    async fn on_frame(&self, transport: &mut dyn WsTransport, msg: Message) -> Result<(), TransportError> {
        incr(&METRICS.frames_received);

        match msg {
            Message::Text(text) => self.normalize(transport, text.as_str()).await,

            Message::Binary(bytes) => match decode_binary(&bytes) {
                Ok(text) => self.normalize(transport, &text).await,
                Err(e) => {
                    incr(&METRICS.parse_errors);
                    warn!("[{}] dropped frame: {}", self.name(), e);
                    Ok(())
                }
            },

            Message::Ping(payload) => {
                debug!("[{}] ping from server", self.name());
                transport.send(Message::Pong(payload)).await
            }

            Message::Pong(_) => {
                incr(&METRICS.pongs_received);
                debug!("[{}] pong from server", self.name());
                Ok(())
            }

            Message::Close(frame) => Err(TransportError::Closed(
                frame
                    .map(|f| format!("code {} {}", u16::from(f.code), f.reason.as_str()))
                    .unwrap_or_else(|| "no reason provided".to_string()),
            )),

            Message::Frame(_) => Ok(()),
        }
    }

    /// Message normalizer → sink.
    async fn normalize(&self, transport: &mut dyn WsTransport, raw: &str) -> Result<(), TransportError> {
        if self.settings.raw_logging {
            debug!("[{}] raw: {}", self.name(), raw);
        }

        match self.adapter.parse_message(raw, &self.settings.subscription) {
            ParseResult::Market(events) => {
                for event in events {
                    match self.sink.store(&event).await {
                        Ok(()) => incr(&METRICS.events_forwarded),
                        Err(e) => {
                            incr(&METRICS.sink_errors);
                            warn!("[{}] sink failed, event dropped: {}", self.name(), e);
                        }
                    }
                }
                Ok(())
            }

            ParseResult::Reply(reply) => transport.send(Message::text(reply.to_string())).await,

            ParseResult::Control => Ok(()),

            ParseResult::Error(e) => {
                incr(&METRICS.parse_errors);
                warn!("[{}] dropped malformed frame: {}", self.name(), e);
                Ok(())
            }
        }
    }

    /// Disconnect side effects: close the socket, revoke the token.
    async fn teardown(&self, session: &mut Session, transport: Option<&mut dyn WsTransport>) {
        let request_timeout = self.settings.timing.request_timeout();

        if let Some(transport) = transport {
            if timeout(request_timeout, transport.close()).await.is_err() {
                debug!("[{}] close handshake timed out", self.name());
            }
        }

        // `take` makes a second revoke of the same token impossible.
        if let (Some(provisioner), Some(token)) = (&self.provisioner, session.token.take()) {
            info!("[{}] revoking session token {}", self.name(), token.redacted());
            provisioner.revoke(token).await;
            incr(&METRICS.tokens_revoked);
        }
    }
}

/// Resolves once shutdown is requested or the sender is gone.
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn tick_opt(interval: &mut Option<Interval>) -> Instant {
    match interval {
        Some(i) => i.tick().await,
        None => std::future::pending().await,
    }
}

async fn join_opt<T>(slot: &mut Option<JoinHandle<T>>) -> Result<T, JoinError> {
    match slot.as_mut() {
        Some(handle) => {
            let res = handle.await;
            *slot = None;
            res
        }
        None => std::future::pending().await,
    }
}

/// Binary frames: UTF-8 text as-is, otherwise gzip.
fn decode_binary(bytes: &[u8]) -> Result<String, ParseError> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(text.to_string());
    }

    let mut out = String::new();
    GzDecoder::new(bytes)
        .read_to_string(&mut out)
        .map_err(|_| ParseError::Binary(bytes.len()))?;
    Ok(out)
}
