//! A typed message channel: one schema, one transport.

use tracing::debug;
use uuid::Uuid;

use crate::codec::{self, Value};
use crate::error::{BareWireError, Result};
use crate::frame::{Frame, MessageType};
use crate::schema::{schema_id, Schema, Validated};
use crate::transport::Transport;

/// Frame header carrying the sender's schema identifier. A receiver that
/// sees a different identifier refuses to decode the payload.
pub const SCHEMA_ID_HEADER: &str = "schema-id";

/// Sends and receives values of one message schema over a transport.
pub struct MessageChannel<'a, T: Transport> {
    schema: &'a Schema<Validated>,
    schema_id: Uuid,
    transport: T,
}

impl<'a, T: Transport> MessageChannel<'a, T> {
    pub fn new(schema: &'a Schema<Validated>, transport: T) -> MessageChannel<'a, T> {
        MessageChannel {
            schema,
            schema_id: schema_id(schema),
            transport,
        }
    }

    pub fn schema(&self) -> &'a Schema<Validated> {
        self.schema
    }

    /// The UUID v5 identifier of this channel's schema, attached to every
    /// outgoing data frame.
    pub fn schema_id(&self) -> Uuid {
        self.schema_id
    }

    /// Encode and send `value` as a request frame. Returns the message id.
    pub fn send(&mut self, value: &Value) -> Result<Uuid> {
        self.send_as(MessageType::Request, None, value)
    }

    /// Encode and send `value` as a frame of the chosen type.
    /// Responses and errors must carry the id of the request they answer.
    pub fn send_as(
        &mut self,
        message_type: MessageType,
        correlation_id: Option<Uuid>,
        value: &Value,
    ) -> Result<Uuid> {
        self.send_with_headers(message_type, correlation_id, value, &[])
    }

    pub fn send_with_headers(
        &mut self,
        message_type: MessageType,
        correlation_id: Option<Uuid>,
        value: &Value,
        headers: &[(&str, &str)],
    ) -> Result<Uuid> {
        let payload = codec::encode(self.schema, value)?;
        let mut frame = match (message_type, correlation_id) {
            (MessageType::Request, _) => Frame::request(payload),
            (MessageType::Notification, _) => Frame::notification(payload),
            (MessageType::Response, Some(id)) => Frame::response(id, payload),
            (MessageType::Error, Some(id)) => Frame::error(id, payload),
            (MessageType::Response | MessageType::Error, None) => {
                return Err(BareWireError::invalid(
                    "response and error frames require a correlation id",
                ))
            }
        };
        frame = frame.with_header(SCHEMA_ID_HEADER, self.schema_id.to_string());
        for (key, header_value) in headers {
            frame = frame.with_header(*key, *header_value);
        }
        let message_id = frame.message_id;
        self.transport.send(&frame)?;
        debug!(%message_id, ?message_type, "message sent");
        Ok(message_id)
    }

    /// An error frame whose payload is the UTF-8 message text, outside the
    /// channel schema.
    pub fn send_error(&mut self, request_id: Uuid, message: &str) -> Result<Uuid> {
        let frame = Frame::error(request_id, message.as_bytes().to_vec());
        let message_id = frame.message_id;
        self.transport.send(&frame)?;
        Ok(message_id)
    }

    /// The next value from the transport, or `None` when no frame is
    /// available.
    pub fn receive(&mut self) -> Result<Option<Value>> {
        Ok(self.receive_frame()?.map(|(_, value)| value))
    }

    /// Like [`receive`](Self::receive), but keeps the frame for callers that
    /// need its metadata.
    pub fn receive_frame(&mut self) -> Result<Option<(Frame, Value)>> {
        let Some(frame) = self.transport.receive()? else {
            return Ok(None);
        };
        let value = self.decode_payload(&frame)?;
        Ok(Some((frame, value)))
    }

    /// The next frame without decoding its payload.
    pub(crate) fn receive_raw(&mut self) -> Result<Option<Frame>> {
        self.transport.receive()
    }

    /// Decode a frame's payload against the channel schema, honouring the
    /// schema id header if the sender attached one.
    pub fn decode_payload(&self, frame: &Frame) -> Result<Value> {
        if let Some(claimed) = frame.header(SCHEMA_ID_HEADER) {
            let expected = self.schema_id.to_string();
            if claimed != expected {
                return Err(BareWireError::TypeMismatch {
                    expected: format!("schema {expected}"),
                    actual: format!("schema {claimed}"),
                });
            }
        }
        codec::decode(self.schema, &frame.payload)
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn close(&mut self) -> Result<()> {
        self.transport.close()
    }
}
