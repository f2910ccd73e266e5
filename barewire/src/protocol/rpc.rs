//! Synchronous request/response on top of a message channel.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::codec::Value;
use crate::error::{BareWireError, Result};
use crate::frame::{Frame, MessageType};
use crate::protocol::channel::MessageChannel;
use crate::transport::Transport;

/// Frame header naming the invoked method on request frames.
pub const METHOD_HEADER: &str = "method";

/// Tuning for [`RpcClient::call`].
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Hard deadline for a call; expiry fails the call and removes it from
    /// the in-flight table. The transport is left untouched.
    pub call_timeout: Duration,
    /// Pause between transport polls while the transport reports no frame.
    pub poll_interval: Duration,
}

impl Default for RpcConfig {
    fn default() -> RpcConfig {
        RpcConfig {
            call_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(2),
        }
    }
}

/// Request/response client. Blocking [`call`]s wait for the matching
/// response; frames that answer nothing outstanding are surfaced through the
/// notification handler or queue.
///
/// [`call`]: RpcClient::call
pub struct RpcClient<'a, T: Transport> {
    channel: MessageChannel<'a, T>,
    config: RpcConfig,
    in_flight: HashMap<Uuid, Instant>,
    pending_notifications: VecDeque<Frame>,
    handler: Option<Box<dyn FnMut(&Frame) + 'a>>,
}

impl<'a, T: Transport> RpcClient<'a, T> {
    pub fn new(channel: MessageChannel<'a, T>) -> RpcClient<'a, T> {
        Self::with_config(channel, RpcConfig::default())
    }

    pub fn with_config(channel: MessageChannel<'a, T>, config: RpcConfig) -> RpcClient<'a, T> {
        RpcClient {
            channel,
            config,
            in_flight: HashMap::new(),
            pending_notifications: VecDeque::new(),
            handler: None,
        }
    }

    /// Register a handler for frames that match no outstanding request.
    /// Without one, such frames queue for [`poll_notification`].
    ///
    /// [`poll_notification`]: RpcClient::poll_notification
    pub fn on_notification(&mut self, handler: impl FnMut(&Frame) + 'a) {
        self.handler = Some(Box::new(handler));
    }

    /// The oldest queued notification, if any.
    pub fn poll_notification(&mut self) -> Option<Frame> {
        self.pending_notifications.pop_front()
    }

    pub fn channel(&self) -> &MessageChannel<'a, T> {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut MessageChannel<'a, T> {
        &mut self.channel
    }

    /// Invoke `method` with `params` and block until the matching response
    /// or error frame arrives, or the configured timeout expires.
    pub fn call(&mut self, method: &str, params: &Value) -> Result<Value> {
        let request_id = self.channel.send_with_headers(
            MessageType::Request,
            None,
            params,
            &[(METHOD_HEADER, method)],
        )?;
        self.in_flight.insert(request_id, Instant::now());
        debug!(method, %request_id, "rpc call issued");

        let started = Instant::now();
        loop {
            match self.channel.receive_raw()? {
                Some(frame) => {
                    if let Some(result) = self.settle(request_id, frame)? {
                        return result;
                    }
                }
                None => {
                    if started.elapsed() >= self.config.call_timeout {
                        self.in_flight.remove(&request_id);
                        let waited_ms = self.config.call_timeout.as_millis() as u64;
                        warn!(method, %request_id, waited_ms, "rpc call timed out");
                        return Err(BareWireError::RpcTimeout { waited_ms });
                    }
                    std::thread::sleep(self.config.poll_interval);
                }
            }
        }
    }

    /// Route one incoming frame. Returns the call outcome when the frame
    /// settles `request_id`, `None` when waiting must continue.
    #[allow(clippy::type_complexity)]
    fn settle(&mut self, request_id: Uuid, frame: Frame) -> Result<Option<Result<Value>>> {
        match frame.message_type {
            MessageType::Response => {
                if self.in_flight.remove(&frame.message_id).is_none() {
                    warn!(message_id = %frame.message_id, "dropping unmatched response");
                    return Ok(None);
                }
                if frame.message_id != request_id {
                    return Ok(None);
                }
                Ok(Some(self.channel.decode_payload(&frame)))
            }
            MessageType::Error => {
                if self.in_flight.remove(&frame.message_id).is_none() {
                    warn!(message_id = %frame.message_id, "dropping unmatched error");
                    return Ok(None);
                }
                if frame.message_id != request_id {
                    return Ok(None);
                }
                let message = String::from_utf8_lossy(&frame.payload).into_owned();
                Ok(Some(Err(BareWireError::Rpc(message))))
            }
            MessageType::Request | MessageType::Notification => {
                self.dispatch_notification(frame);
                Ok(None)
            }
        }
    }

    fn dispatch_notification(&mut self, frame: Frame) {
        match &mut self.handler {
            Some(handler) => handler(&frame),
            None => self.pending_notifications.push_back(frame),
        }
    }

    /// Answer a received request.
    pub fn reply(&mut self, request_id: Uuid, value: &Value) -> Result<Uuid> {
        self.channel
            .send_as(MessageType::Response, Some(request_id), value)
    }

    /// Fail a received request with a message.
    pub fn reply_error(&mut self, request_id: Uuid, message: &str) -> Result<Uuid> {
        self.channel.send_error(request_id, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::channel::SCHEMA_ID_HEADER;
    use crate::schema::{Schema, StructField, Type, Validated};
    use crate::transport::InMemoryTransport;

    fn ping_schema() -> Schema<Validated> {
        Schema::draft("Ping")
            .define(
                "Ping",
                Type::structure([StructField::new("seq", Type::u32())]),
            )
            .validate()
            .unwrap()
    }

    fn ping(seq: u32) -> Value {
        Value::structure([("seq", Value::U32(seq))])
    }

    fn quick_config() -> RpcConfig {
        RpcConfig {
            call_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_call_completes_on_matching_response() {
        let schema = ping_schema();
        let (client_end, server_end) = InMemoryTransport::pair();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                let mut server =
                    RpcClient::with_config(MessageChannel::new(&schema, server_end), quick_config());
                // Wait for the request, then answer it.
                loop {
                    match server.channel_mut().receive_frame().unwrap() {
                        Some((frame, value)) => {
                            assert_eq!(frame.header(METHOD_HEADER), Some("ping"));
                            assert_eq!(value, ping(7));
                            server.reply(frame.message_id, &ping(8)).unwrap();
                            break;
                        }
                        None => std::thread::sleep(Duration::from_millis(1)),
                    }
                }
            });

            let mut client =
                RpcClient::with_config(MessageChannel::new(&schema, client_end), quick_config());
            let response = client.call("ping", &ping(7)).unwrap();
            assert_eq!(response, ping(8));
            assert!(client.in_flight.is_empty());
        });
    }

    #[test]
    fn test_error_frame_fails_the_call() {
        let schema = ping_schema();
        let (client_end, server_end) = InMemoryTransport::pair();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                let mut server =
                    RpcClient::with_config(MessageChannel::new(&schema, server_end), quick_config());
                loop {
                    match server.channel_mut().receive_frame().unwrap() {
                        Some((frame, _)) => {
                            server.reply_error(frame.message_id, "no such method").unwrap();
                            break;
                        }
                        None => std::thread::sleep(Duration::from_millis(1)),
                    }
                }
            });

            let mut client =
                RpcClient::with_config(MessageChannel::new(&schema, client_end), quick_config());
            let err = client.call("nope", &ping(1)).unwrap_err();
            assert_eq!(err, BareWireError::Rpc("no such method".into()));
            assert!(client.in_flight.is_empty());
        });
    }

    #[test]
    fn test_timeout_cleans_in_flight_table() {
        let schema = ping_schema();
        let (client_end, _server_end) = InMemoryTransport::pair();
        let mut client =
            RpcClient::with_config(MessageChannel::new(&schema, client_end), quick_config());

        let err = client.call("ping", &ping(1)).unwrap_err();
        assert_eq!(err, BareWireError::RpcTimeout { waited_ms: 200 });
        assert!(client.in_flight.is_empty());
    }

    #[test]
    fn test_notifications_surface_during_call() {
        let schema = ping_schema();
        let (client_end, mut server_end) = InMemoryTransport::pair();

        // Queue a notification ahead of the response so the call must route
        // past it.
        use crate::codec::encode;
        use crate::transport::Transport;
        let notification =
            Frame::notification(encode(&schema, &ping(99)).unwrap());
        server_end.send(&notification).unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                let mut dummy = StreamDummy { end: server_end };
                dummy.respond(&schema);
            });

            let mut client =
                RpcClient::with_config(MessageChannel::new(&schema, client_end), quick_config());
            let response = client.call("ping", &ping(1)).unwrap();
            assert_eq!(response, ping(2));

            let queued = client.poll_notification().unwrap();
            assert_eq!(queued.message_type, MessageType::Notification);
        });
    }

    #[test]
    fn test_stale_response_is_dropped_not_delivered() {
        let schema = ping_schema();
        let (client_end, mut server_end) = InMemoryTransport::pair();

        // A response nobody asked for arrives before the real one.
        use crate::codec::encode;
        use crate::transport::Transport;
        let stale = Frame::response(Uuid::new_v4(), encode(&schema, &ping(0)).unwrap());
        server_end.send(&stale).unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                let mut dummy = StreamDummy { end: server_end };
                dummy.respond(&schema);
            });

            let mut client =
                RpcClient::with_config(MessageChannel::new(&schema, client_end), quick_config());
            let response = client.call("ping", &ping(1)).unwrap();
            assert_eq!(response, ping(2));
            assert!(client.poll_notification().is_none());
        });
    }

    /// Minimal responder: waits for the first request and answers `ping(2)`.
    struct StreamDummy {
        end: InMemoryTransport,
    }

    impl StreamDummy {
        fn respond(&mut self, schema: &Schema<Validated>) {
            use crate::codec::encode;
            use crate::transport::Transport;
            loop {
                match self.end.receive().unwrap() {
                    Some(frame) if frame.message_type == MessageType::Request => {
                        let payload = encode(schema, &ping(2)).unwrap();
                        let reply = Frame::response(frame.message_id, payload).with_header(
                            SCHEMA_ID_HEADER,
                            crate::schema::schema_id(schema).to_string(),
                        );
                        self.end.send(&reply).unwrap();
                        return;
                    }
                    Some(_) => continue,
                    None => std::thread::sleep(Duration::from_millis(1)),
                }
            }
        }
    }
}
