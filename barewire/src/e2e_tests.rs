//! Cross-layer scenarios: schema → codec → view → frame → protocol against
//! a live transport pair, plus the universal encode/decode laws on a mixed
//! schema.

use crate::codec::{decode, encode, MapKey, Value};
use crate::frame::MessageType;
use crate::protocol::{MessageChannel, RpcClient, RpcConfig, METHOD_HEADER};
use crate::schema::{schema_id, Schema, StructField, Type, Validated};
use crate::transport::{InMemoryTransport, StreamReassembler, Transport};
use crate::view::MemoryView;
use crate::{BareWireError, Frame};

use std::time::Duration;

/// A schema touching every aggregate and a good spread of primitives.
fn kitchen_sink_schema() -> Schema<Validated> {
    Schema::draft("Record")
        .define(
            "Record",
            Type::structure([
                StructField::new("id", Type::uint()),
                StructField::new("delta", Type::int()),
                StructField::new("flags", Type::u16()),
                StructField::new("ratio", Type::f64()),
                StructField::new("alive", Type::bool()),
                StructField::new("name", Type::string()),
                StructField::new("blob", Type::data()),
                StructField::new("digest", Type::fixed_data(4)),
                StructField::new("status", Type::user("Status")),
                StructField::new("nick", Type::optional(Type::string())),
                StructField::new("scores", Type::list(Type::i32())),
                StructField::new("triple", Type::fixed_list(Type::u8(), 3)),
                StructField::new("labels", Type::map(Type::string(), Type::u32())),
                StructField::new("event", Type::user("Event")),
            ]),
        )
        .define(
            "Status",
            Type::enumeration([("idle", 0u64), ("busy", 1u64), ("gone", 255u64)]),
        )
        .define(
            "Event",
            Type::union([(0, Type::void()), (1, Type::user("Payload"))]),
        )
        .define(
            "Payload",
            Type::structure([StructField::new("body", Type::string())]),
        )
        .validate()
        .unwrap()
}

fn kitchen_sink_value() -> Value {
    Value::structure([
        ("id", Value::UInt(1_048_576)),
        ("delta", Value::Int(-42)),
        ("flags", Value::U16(0xF00D)),
        ("ratio", Value::F64(0.5)),
        ("alive", Value::Bool(true)),
        ("name", Value::string("päivä 🎉")),
        ("blob", Value::data([0xDE, 0xAD])),
        ("digest", Value::data([1, 2, 3, 4])),
        ("status", Value::Enum(255)),
        ("nick", Value::some(Value::string("p"))),
        (
            "scores",
            Value::List(vec![Value::I32(-1), Value::I32(0), Value::I32(7)]),
        ),
        (
            "triple",
            Value::List(vec![Value::U8(9), Value::U8(8), Value::U8(7)]),
        ),
        (
            "labels",
            Value::map([
                (MapKey::from("b"), Value::U32(2)),
                (MapKey::from("a"), Value::U32(1)),
            ]),
        ),
        (
            "event",
            Value::union(1, Value::structure([("body", Value::string("boom"))])),
        ),
    ])
}

#[test]
fn test_law_decode_encode_identity() {
    let schema = kitchen_sink_schema();
    let value = kitchen_sink_value();
    let bytes = encode(&schema, &value).unwrap();
    assert_eq!(decode(&schema, &bytes).unwrap(), value);
}

#[test]
fn test_law_encode_decode_bytes_identity() {
    let schema = kitchen_sink_schema();
    let bytes = encode(&schema, &kitchen_sink_value()).unwrap();
    let reencoded = encode(&schema, &decode(&schema, &bytes).unwrap()).unwrap();
    assert_eq!(reencoded, bytes);
}

#[test]
fn test_law_view_agrees_with_decode() {
    let schema = kitchen_sink_schema();
    let value = kitchen_sink_value();
    let bytes = encode(&schema, &value).unwrap();
    let view = MemoryView::over(&schema, &bytes);

    for field in ["id", "flags", "name", "scores", "labels", "event"] {
        assert_eq!(&view.get(field).unwrap(), value.field(field).unwrap(), "{field}");
    }
}

#[test]
fn test_schema_id_agrees_between_peers() {
    let a = kitchen_sink_schema();
    let b = kitchen_sink_schema();
    assert_eq!(schema_id(&a), schema_id(&b));
}

#[test]
fn test_frames_over_reassembled_stream() {
    let schema = kitchen_sink_schema();
    let payload = encode(&schema, &kitchen_sink_value()).unwrap();

    // Simulate a stream transport: encode frames, shred them into odd-sized
    // chunks, reassemble, decode payloads.
    let frames = [
        Frame::request(payload.clone()),
        Frame::notification(payload.clone()),
    ];
    let mut wire = Vec::new();
    for frame in &frames {
        wire.extend_from_slice(&frame.encode().unwrap());
    }

    let mut reassembler = StreamReassembler::new();
    let mut received = Vec::new();
    for chunk in wire.chunks(13) {
        reassembler.feed(chunk);
        while let Some(frame) = reassembler.next_frame().unwrap() {
            received.push(frame);
        }
    }
    assert_eq!(received.len(), 2);
    for (sent, got) in frames.iter().zip(&received) {
        assert_eq!(got, sent);
        assert_eq!(
            decode(&schema, &got.payload).unwrap(),
            kitchen_sink_value()
        );
    }
}

#[test]
fn test_channel_end_to_end() {
    let schema = kitchen_sink_schema();
    let (a, b) = InMemoryTransport::pair();
    let mut sender = MessageChannel::new(&schema, a);
    let mut receiver = MessageChannel::new(&schema, b);

    let value = kitchen_sink_value();
    sender.send(&value).unwrap();
    assert_eq!(receiver.receive().unwrap(), Some(value));
    assert_eq!(receiver.receive().unwrap(), None);
}

#[test]
fn test_rpc_end_to_end_with_notifications() {
    let schema = kitchen_sink_schema();
    let (client_end, server_end) = InMemoryTransport::pair();

    std::thread::scope(|scope| {
        scope.spawn(|| {
            let mut server = MessageChannel::new(&schema, server_end);
            loop {
                match server.receive_frame().unwrap() {
                    Some((frame, value)) if frame.message_type == MessageType::Request => {
                        assert_eq!(frame.header(METHOD_HEADER), Some("echo"));
                        // Push a notification first, then the answer.
                        server
                            .send_as(MessageType::Notification, None, &value)
                            .unwrap();
                        server
                            .send_as(MessageType::Response, Some(frame.message_id), &value)
                            .unwrap();
                        break;
                    }
                    Some(_) => continue,
                    None => std::thread::sleep(Duration::from_millis(1)),
                }
            }
        });

        let mut client = RpcClient::with_config(
            MessageChannel::new(&schema, client_end),
            RpcConfig {
                call_timeout: Duration::from_secs(2),
                poll_interval: Duration::from_millis(1),
            },
        );
        let value = kitchen_sink_value();
        let response = client.call("echo", &value).unwrap();
        assert_eq!(response, value);

        let notification = client.poll_notification().unwrap();
        assert_eq!(notification.message_type, MessageType::Notification);
        assert_eq!(
            client.channel().decode_payload(&notification).unwrap(),
            value
        );
    });
}

#[test]
fn test_view_set_then_send_roundtrip() {
    // Patch a record in place through a view, then ship it over a channel
    // and check the patch arrived.
    let schema = kitchen_sink_schema();
    let value = kitchen_sink_value();
    let mut bytes = encode(&schema, &value).unwrap();

    let mut view = MemoryView::over_mut(&schema, &mut bytes);
    view.set("flags", &Value::U16(0x0001)).unwrap();
    view.set("digest", &Value::data([9, 9, 9, 9])).unwrap();

    let (mut a, b) = InMemoryTransport::pair();
    a.send(&Frame::request(bytes.clone())).unwrap();
    let mut receiver = MessageChannel::new(&schema, b);
    let received = receiver.receive().unwrap().unwrap();
    assert_eq!(received.field("flags"), Some(&Value::U16(0x0001)));
    assert_eq!(received.field("digest"), Some(&Value::data([9, 9, 9, 9])));
    assert_eq!(received.field("name"), value.field("name"));
}

#[test]
fn test_wrong_schema_peer_is_rejected() {
    let schema = kitchen_sink_schema();
    let other = Schema::draft("Other")
        .define("Other", Type::structure([StructField::new("x", Type::u8())]))
        .validate()
        .unwrap();

    let (a, b) = InMemoryTransport::pair();
    let mut sender = MessageChannel::new(&other, a);
    let mut receiver = MessageChannel::new(&schema, b);

    sender
        .send(&Value::structure([("x", Value::U8(1))]))
        .unwrap();
    let err = receiver.receive().unwrap_err();
    assert!(matches!(err, BareWireError::TypeMismatch { .. }), "{err:?}");
}
