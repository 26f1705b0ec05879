//! Per-connection pump between a websocket and the hub.
//!
//! The reader loop turns inbound frames into hub broadcasts and owns the read
//! deadline. The writer loop drains the connection's outbound queue and sends
//! keepalive pings. Whichever stops first ends the connection.

use std::{error::Error as StdError, fmt::Display, io, time::Duration};

use axum::{
    body::Bytes,
    extract::ws::{close_code, CloseFrame, Message as Frame, Utf8Bytes, WebSocket},
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::{
    sync::mpsc,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, warn};

use crate::{
    config::WsConfig,
    hub::{HubHandle, Message, Outbound, Outbox, Subscription},
};

pub async fn serve(socket: WebSocket, hub: HubHandle, subscription: Subscription, config: WsConfig) {
    let (sink, stream) = socket.split();
    pump(sink, stream, hub, subscription, config).await;
}

/// Registers the connection, runs both loops and unregisters once either
/// one stops. Returns after the writer has sent its close frame.
pub async fn pump<W, R, E>(sink: W, stream: R, hub: HubHandle, subscription: Subscription, config: WsConfig)
where
    W: Sink<Frame> + Unpin + Send + 'static,
    W::Error: Display + Send,
    R: Stream<Item = Result<Frame, E>> + Unpin,
    E: StdError + 'static,
{
    let (outbox, queue) = Outbox::channel(config.send_buffer);
    if hub.register(subscription.clone(), outbox).is_err() {
        warn!(user = subscription.sender(), "hub is not running, dropping connection");
        return;
    }

    let mut writer = tokio::spawn(write_loop(sink, queue, config.clone()));
    let writer_done = tokio::select! {
        end = read_loop(stream, &hub, &subscription, config.pong_wait) => {
            end.log(&subscription);
            false
        }
        _ = &mut writer => true,
    };

    let _ = hub.unregister(subscription);
    if !writer_done {
        let _ = writer.await;
    }
}

#[derive(Debug)]
enum ReadEnd {
    Closed(Option<u16>),
    Finished,
    TimedOut,
    Failed { error: String, peer_gone: bool },
    HubStopped,
}

impl ReadEnd {
    fn log(&self, subscription: &Subscription) {
        let user = subscription.sender();
        let connection = subscription.id();
        match self {
            ReadEnd::Closed(None) | ReadEnd::Finished => {
                debug!(user, %connection, "peer went away");
            }
            ReadEnd::Closed(Some(code)) if matches!(*code, close_code::NORMAL | close_code::AWAY) => {
                debug!(user, %connection, code, "peer went away");
            }
            ReadEnd::Closed(Some(code)) => warn!(user, %connection, code, "peer closed unexpectedly"),
            ReadEnd::TimedOut => warn!(user, %connection, "read timed out"),
            ReadEnd::Failed { error, peer_gone: true } => {
                debug!(user, %connection, %error, "peer went away");
            }
            ReadEnd::Failed { error, peer_gone: false } => warn!(user, %connection, %error, "read failed"),
            ReadEnd::HubStopped => warn!(user, %connection, "hub is not running"),
        }
    }
}

/// Every frame, pongs included, pushes the read deadline out by `pong_wait`.
async fn read_loop<R, E>(mut stream: R, hub: &HubHandle, subscription: &Subscription, pong_wait: Duration) -> ReadEnd
where
    R: Stream<Item = Result<Frame, E>> + Unpin,
    E: StdError + 'static,
{
    loop {
        let frame = match time::timeout(pong_wait, stream.next()).await {
            Err(_) => return ReadEnd::TimedOut,
            Ok(None) => return ReadEnd::Finished,
            Ok(Some(Err(e))) => {
                return ReadEnd::Failed {
                    error: e.to_string(),
                    peer_gone: peer_gone(&e),
                };
            }
            Ok(Some(Ok(frame))) => frame,
        };

        let data = match frame {
            Frame::Text(text) => text.as_str().to_owned(),
            Frame::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Frame::Ping(_) | Frame::Pong(_) => continue,
            Frame::Close(frame) => return ReadEnd::Closed(frame.map(|f| f.code)),
        };

        let message = Message::new(
            subscription.id(),
            subscription.destination().clone(),
            subscription.sender(),
            data,
        );
        if hub.broadcast(message).is_err() {
            return ReadEnd::HubStopped;
        }
    }
}

fn peer_gone(error: &(dyn StdError + 'static)) -> bool {
    let mut source = Some(error);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<io::Error>() {
            return matches!(
                io.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            );
        }
        source = err.source();
    }
    false
}

#[derive(Debug, thiserror::Error)]
enum WriteError {
    #[error("write timed out")]
    TimedOut,
    #[error("{0}")]
    Transport(String),
}

async fn write_loop<W>(mut sink: W, mut queue: mpsc::Receiver<Outbound>, config: WsConfig)
where
    W: Sink<Frame> + Unpin,
    W::Error: Display,
{
    let mut keepalive = time::interval_at(Instant::now() + config.ping_period, config.ping_period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let frame = tokio::select! {
            outbound = queue.recv() => match outbound {
                Some(Outbound::Text(payload)) => Frame::Text(payload),
                Some(Outbound::Close { code, reason }) => {
                    let close = CloseFrame { code, reason: Utf8Bytes::from_static(reason) };
                    let _ = write(&mut sink, Frame::Close(Some(close)), config.write_wait).await;
                    return;
                }
                None => {
                    let _ = write(&mut sink, Frame::Close(None), config.write_wait).await;
                    return;
                }
            },
            _ = keepalive.tick() => Frame::Ping(Bytes::new()),
        };

        if let Err(e) = write(&mut sink, frame, config.write_wait).await {
            debug!(error = %e, "write failed, closing connection");
            return;
        }
    }
}

async fn write<W>(sink: &mut W, frame: Frame, wait: Duration) -> Result<(), WriteError>
where
    W: Sink<Frame> + Unpin,
    W::Error: Display,
{
    match time::timeout(wait, sink.send(frame)).await {
        Err(_) => Err(WriteError::TimedOut),
        Ok(Err(e)) => Err(WriteError::Transport(e.to_string())),
        Ok(Ok(())) => Ok(()),
    }
}
