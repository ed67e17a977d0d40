//! Live album events over STOMP.
//!
//! One background task owns the WebSocket. It connects, subscribes to the
//! configured topic and feeds every MESSAGE into the `NotificationFeed`. When
//! the connection drops it waits a fixed delay and starts over, until
//! `disconnect()` signals it to stop.

use crate::auth::SessionState;
use crate::configuration::NotificationSettings;
use crate::notifications::{Frame, NotificationFeed};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

const SUBSCRIPTION_ID: &str = "sub-0";

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Error)]
enum StreamError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("connection closed by server")]
    Closed,
    #[error("no heart-beat from server for {0:?}")]
    HeartbeatTimeout(Duration),
}

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

#[derive(Clone)]
pub struct NotificationStream {
    settings: NotificationSettings,
    feed: NotificationFeed,
    status: Arc<watch::Sender<ConnectionStatus>>,
    task: Arc<Mutex<Option<Running>>>,
}

impl NotificationStream {
    pub fn new(settings: NotificationSettings, feed: NotificationFeed) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            settings,
            feed,
            status: Arc::new(status),
            task: Arc::new(Mutex::new(None)),
        }
    }

    pub fn feed(&self) -> &NotificationFeed {
        &self.feed
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Starts the background connection. Does nothing if one is already running.
    pub async fn connect(&self) {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            debug!("notification stream already connected or connecting");
            return;
        }

        info!(url = %self.settings.ws_url, "starting notification stream");
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(
            self.settings.clone(),
            self.feed.clone(),
            self.status.clone(),
            shutdown_rx,
        ));
        *task = Some(Running { shutdown, handle });
    }

    /// Stops the background connection and waits for it to finish.
    pub async fn disconnect(&self) {
        let running = self.task.lock().await.take();
        let Some(running) = running else {
            return;
        };

        let _ = running.shutdown.send(true);
        if let Err(e) = running.handle.await {
            warn!(error = %e, "notification task ended abnormally");
        }
        self.status.send_replace(ConnectionStatus::Disconnected);
        info!("notification stream disconnected");
    }

    /// Keeps the stream in step with the session: connected while
    /// authenticated, disconnected otherwise.
    pub fn follow_session(&self, session: &SessionState) -> JoinHandle<()> {
        let stream = self.clone();
        let mut session_rx = session.subscribe();

        tokio::spawn(async move {
            loop {
                let authenticated = session_rx.borrow_and_update().is_authenticated;
                if authenticated {
                    stream.connect().await;
                } else {
                    stream.disconnect().await;
                }

                if session_rx.changed().await.is_err() {
                    break;
                }
            }
            stream.disconnect().await;
        })
    }
}

async fn run(
    settings: NotificationSettings,
    feed: NotificationFeed,
    status: Arc<watch::Sender<ConnectionStatus>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let delay = settings.reconnect_delay();

    loop {
        if *shutdown.borrow() {
            break;
        }

        status.send_replace(ConnectionStatus::Connecting);
        match session(&settings, &feed, &status, &mut shutdown).await {
            Ok(()) => break,
            Err(e) => warn!(error = %e, retry_in = ?delay, "notification stream interrupted"),
        }
        status.send_replace(ConnectionStatus::Disconnected);

        tokio::select! {
            _ = sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    status.send_replace(ConnectionStatus::Disconnected);
}

/// Runs one connection until it fails or shutdown is requested (`Ok`).
async fn session(
    settings: &NotificationSettings,
    feed: &NotificationFeed,
    status: &watch::Sender<ConnectionStatus>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), StreamError> {
    let (mut socket, _) = tokio::select! {
        connected = connect_async(settings.ws_url.as_str()) => connected?,
        _ = shutdown.changed() => return Ok(()),
    };
    debug!(url = %settings.ws_url, "websocket open");

    let host = reqwest::Url::parse(&settings.ws_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| "localhost".to_string());
    send_frame(&mut socket, &Frame::connect(&host, settings.heartbeat_ms)).await?;

    // interval() panics on a zero period
    let mut heartbeat = interval(settings.heartbeat().max(Duration::from_millis(100)));
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut beats = Heartbeats::default();
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = send_frame(&mut socket, &Frame::disconnect()).await;
                let _ = socket.close(None).await;
                return Ok(());
            }
            _ = heartbeat.tick() => {
                if let Some(limit) = beats.incoming {
                    if last_seen.elapsed() > limit * 2 {
                        return Err(StreamError::HeartbeatTimeout(last_seen.elapsed()));
                    }
                }
                if beats.outgoing {
                    socket.send(Message::Text("\n".to_string())).await?;
                }
            }
            message = socket.next() => {
                last_seen = Instant::now();
                match message {
                    None => return Err(StreamError::Closed),
                    Some(Err(e)) => return Err(e.into()),
                    Some(Ok(Message::Text(text))) => {
                        let frame = match Frame::parse(&text) {
                            Ok(Some(frame)) => frame,
                            Ok(None) => continue,
                            Err(e) => {
                                warn!(error = %e, "skipping malformed frame");
                                continue;
                            }
                        };
                        handle_frame(frame, settings, feed, status, &mut beats, &mut socket).await?;
                    }
                    Some(Ok(Message::Close(_))) => return Err(StreamError::Closed),
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

/// Heart-beat directions agreed in CONNECTED.
#[derive(Default)]
struct Heartbeats {
    incoming: Option<Duration>,
    outgoing: bool,
}

impl Heartbeats {
    /// `server` is the CONNECTED `heart-beat` header, `cx,cy` from the server side.
    fn negotiate(server: Option<&str>, ours_ms: u64) -> Self {
        let (sx, sy) = server
            .and_then(|v| v.split_once(','))
            .and_then(|(x, y)| Some((x.trim().parse::<u64>().ok()?, y.trim().parse::<u64>().ok()?)))
            .unwrap_or((0, 0));

        Self {
            incoming: (sx != 0 && ours_ms != 0).then(|| Duration::from_millis(sx.max(ours_ms))),
            outgoing: sy != 0 && ours_ms != 0,
        }
    }
}

async fn handle_frame(
    frame: Frame,
    settings: &NotificationSettings,
    feed: &NotificationFeed,
    status: &watch::Sender<ConnectionStatus>,
    beats: &mut Heartbeats,
    socket: &mut Socket,
) -> Result<(), StreamError> {
    match frame.command.as_str() {
        "CONNECTED" => {
            *beats = Heartbeats::negotiate(frame.get("heart-beat"), settings.heartbeat_ms);
            send_frame(socket, &Frame::subscribe(SUBSCRIPTION_ID, &settings.topic)).await?;
            status.send_replace(ConnectionStatus::Connected);
            info!(topic = %settings.topic, "subscribed to notifications");
        }
        "MESSAGE" => {
            feed.push_json(&frame.body);
        }
        "ERROR" => {
            warn!(
                reason = frame.get("message").unwrap_or_default(),
                body = %frame.body,
                "STOMP error from server"
            );
        }
        other => debug!(command = other, "ignoring frame"),
    }
    Ok(())
}

async fn send_frame(socket: &mut Socket, frame: &Frame) -> Result<(), StreamError> {
    socket.send(Message::Text(frame.encode())).await?;
    Ok(())
}
