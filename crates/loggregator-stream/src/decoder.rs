// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Frame decoding for the legacy Loggregator `LogMessage` envelope.
//!
//! Frames are protobuf encoded. The protobuf text format of the same schema is
//! accepted through [`decode_text`] for diagnostics and tests and produces the
//! same [`LogRecord`] as its binary counterpart.

use std::sync::OnceLock;

use prost::Message;
use prost_reflect::{DescriptorPool, DynamicMessage, MessageDescriptor};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet,
};

use crate::errors::DecodeError;
use crate::log_record::{Channel, LogRecord};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MessageType {
    Out = 1,
    Err = 2,
}

/// Wire envelope. Every field is optional on the wire so that missing
/// required fields can be reported instead of silently defaulted.
#[derive(Clone, PartialEq, prost::Message)]
pub struct LogEnvelope {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub message: Option<Vec<u8>>,
    #[prost(enumeration = "MessageType", optional, tag = "2")]
    pub message_type: Option<i32>,
    #[prost(sint64, optional, tag = "3")]
    pub timestamp: Option<i64>,
    #[prost(string, optional, tag = "4")]
    pub app_id: Option<String>,
    #[prost(string, optional, tag = "6")]
    pub source_id: Option<String>,
    #[prost(string, repeated, tag = "7")]
    pub drain_urls: Vec<String>,
    #[prost(string, optional, tag = "8")]
    pub source_name: Option<String>,
}

impl LogEnvelope {
    fn into_record(self) -> Result<LogRecord, DecodeError> {
        let message = self.message.ok_or(DecodeError::MissingField("message"))?;
        let raw_type = self
            .message_type
            .ok_or(DecodeError::MissingField("message_type"))?;
        let channel = match MessageType::try_from(raw_type) {
            Ok(MessageType::Out) => Channel::Stdout,
            Ok(MessageType::Err) => Channel::Stderr,
            Err(_) => return Err(DecodeError::UnknownMessageType(raw_type)),
        };
        let timestamp_nanos = self
            .timestamp
            .ok_or(DecodeError::MissingField("timestamp"))?;
        let app_id = self.app_id.ok_or(DecodeError::MissingField("app_id"))?;

        Ok(LogRecord {
            app_id,
            message: String::from_utf8_lossy(&message).into_owned(),
            timestamp_nanos,
            channel,
            source_name: self.source_name.unwrap_or_default(),
            source_id: self.source_id.unwrap_or_default(),
        })
    }
}

const TEXT_MESSAGE_NAME: &str = "logmessage.LogMessage";

fn field(name: &str, number: i32, kind: Type, label: Label) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(label as i32),
        r#type: Some(kind as i32),
        ..Default::default()
    }
}

fn enum_value(name: &str, number: i32) -> EnumValueDescriptorProto {
    EnumValueDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        ..Default::default()
    }
}

/// Descriptor of [`LogEnvelope`]. Must stay in sync with its prost attributes.
fn envelope_file_descriptor() -> FileDescriptorProto {
    let mut message_type = field("message_type", 2, Type::Enum, Label::Optional);
    message_type.type_name = Some(".logmessage.LogMessage.MessageType".to_string());

    FileDescriptorProto {
        name: Some("logmessage.proto".to_string()),
        package: Some("logmessage".to_string()),
        syntax: Some("proto2".to_string()),
        message_type: vec![DescriptorProto {
            name: Some("LogMessage".to_string()),
            field: vec![
                field("message", 1, Type::Bytes, Label::Optional),
                message_type,
                field("timestamp", 3, Type::Sint64, Label::Optional),
                field("app_id", 4, Type::String, Label::Optional),
                field("source_id", 6, Type::String, Label::Optional),
                field("drain_urls", 7, Type::String, Label::Repeated),
                field("source_name", 8, Type::String, Label::Optional),
            ],
            enum_type: vec![EnumDescriptorProto {
                name: Some("MessageType".to_string()),
                value: vec![enum_value("OUT", 1), enum_value("ERR", 2)],
                ..Default::default()
            }],
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn text_descriptor() -> Result<&'static MessageDescriptor, DecodeError> {
    static DESCRIPTOR: OnceLock<Result<MessageDescriptor, String>> = OnceLock::new();
    DESCRIPTOR
        .get_or_init(|| {
            let pool = DescriptorPool::from_file_descriptor_set(FileDescriptorSet {
                file: vec![envelope_file_descriptor()],
            })
            .map_err(|e| e.to_string())?;
            pool.get_message_by_name(TEXT_MESSAGE_NAME)
                .ok_or_else(|| format!("{TEXT_MESSAGE_NAME} not found"))
        })
        .as_ref()
        .map_err(|e| DecodeError::Schema(e.clone()))
}

/// Decodes one binary transport frame.
pub fn decode(frame: &[u8]) -> Result<LogRecord, DecodeError> {
    LogEnvelope::decode(frame)?.into_record()
}

/// Decodes the protobuf text format rendering of an envelope.
///
/// ```
/// use loggregator_stream::decoder::decode_text;
///
/// let record =
///     decode_text(r#"message: "hi" message_type: ERR timestamp: 5000000 app_id: "app""#)
///         .unwrap();
/// assert_eq!(record.timestamp_millis(), 5);
/// assert_eq!(record.channel.to_string(), "stderr");
/// ```
pub fn decode_text(text: &str) -> Result<LogRecord, DecodeError> {
    let message = DynamicMessage::parse_text_format(text_descriptor()?.clone(), text)?;
    message.transcode_to::<LogEnvelope>()?.into_record()
}

/// Encodes a record as a binary frame that [`decode`] accepts.
#[must_use]
pub fn encode(record: &LogRecord) -> Vec<u8> {
    let message_type = match record.channel {
        Channel::Stdout => MessageType::Out,
        Channel::Stderr => MessageType::Err,
    };
    LogEnvelope {
        message: Some(record.message.clone().into_bytes()),
        message_type: Some(message_type as i32),
        timestamp: Some(record.timestamp_nanos),
        app_id: Some(record.app_id.clone()),
        source_id: Some(record.source_id.clone()),
        drain_urls: Vec::new(),
        source_name: Some(record.source_name.clone()),
    }
    .encode_to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_record::test_record;

    fn envelope() -> LogEnvelope {
        LogEnvelope {
            message: Some(b"Started worker".to_vec()),
            message_type: Some(MessageType::Err as i32),
            timestamp: Some(1_650_000_000_000_000_001),
            app_id: Some("4a9c-app".to_string()),
            source_id: Some("2".to_string()),
            drain_urls: vec!["syslog://drain.example.com".to_string()],
            source_name: Some("App".to_string()),
        }
    }

    #[test]
    fn test_decode_binary_frame() {
        let frame = envelope().encode_to_vec();
        let record = decode(&frame).expect("frame should decode");

        assert_eq!(record.app_id, "4a9c-app");
        assert_eq!(record.message, "Started worker");
        assert_eq!(record.timestamp_nanos, 1_650_000_000_000_000_001);
        assert_eq!(record.channel, Channel::Stderr);
        assert_eq!(record.source_name, "App");
        assert_eq!(record.source_id, "2");
    }

    #[test]
    fn test_encode_is_accepted_by_decode() {
        let record = test_record(987_654_321);
        assert_eq!(decode(&encode(&record)), Ok(record));
    }

    #[test]
    fn test_text_frame_matches_binary_frame() {
        let text = r#"
            message: "Started worker"
            message_type: ERR
            timestamp: 1650000000000000001
            app_id: "4a9c-app"
            source_id: "2"
            drain_urls: "syslog://drain.example.com"
            source_name: "App"
        "#;
        let from_text = decode_text(text).expect("text should decode");
        let from_binary = decode(&envelope().encode_to_vec()).expect("frame should decode");
        assert_eq!(from_text, from_binary);
    }

    #[test]
    fn test_text_schema_matches_envelope() {
        let descriptor = text_descriptor().expect("schema should build");
        let fields: Vec<(String, u32)> = descriptor
            .fields()
            .map(|f| (f.name().to_string(), f.number()))
            .collect();
        assert_eq!(
            fields,
            [
                ("message", 1),
                ("message_type", 2),
                ("timestamp", 3),
                ("app_id", 4),
                ("source_id", 6),
                ("drain_urls", 7),
                ("source_name", 8),
            ]
            .map(|(name, number)| (name.to_string(), number))
        );
    }

    #[test]
    fn test_optional_fields_default_to_empty() {
        let mut env = envelope();
        env.source_id = None;
        env.source_name = None;
        let record = decode(&env.encode_to_vec()).expect("frame should decode");
        assert_eq!(record.source_id, "");
        assert_eq!(record.source_name, "");
    }

    #[test]
    fn test_missing_required_fields() {
        let mut env = envelope();
        env.app_id = None;
        assert_eq!(
            decode(&env.encode_to_vec()),
            Err(DecodeError::MissingField("app_id"))
        );

        let mut env = envelope();
        env.timestamp = None;
        assert_eq!(
            decode(&env.encode_to_vec()),
            Err(DecodeError::MissingField("timestamp"))
        );

        assert_eq!(decode(&[]), Err(DecodeError::MissingField("message")));
    }

    #[test]
    fn test_unknown_message_type() {
        let mut env = envelope();
        env.message_type = Some(9);
        assert_eq!(
            decode(&env.encode_to_vec()),
            Err(DecodeError::UnknownMessageType(9))
        );
    }

    #[test]
    fn test_garbage_frame_is_malformed() {
        // Field 1 declared as length-delimited with a length past the end of the buffer.
        let result = decode(&[0x0a, 0x40, 0x01]);
        assert!(matches!(result, Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut env = envelope();
        env.message = Some(vec![b'o', b'k', 0xff]);
        let record = decode(&env.encode_to_vec()).expect("frame should decode");
        assert_eq!(record.message, "ok\u{fffd}");
    }

    #[test]
    fn test_malformed_text() {
        assert!(matches!(
            decode_text("message: {"),
            Err(DecodeError::MalformedText(_))
        ));
        assert!(matches!(
            decode_text(r#"message: "x" message_type: WARN timestamp: 1 app_id: "a""#),
            Err(DecodeError::MalformedText(_))
        ));
        assert!(matches!(
            decode_text(r#"message: "x" colour: "red""#),
            Err(DecodeError::MalformedText(_))
        ));
        assert_eq!(
            decode_text(r#"message: "x" message_type: OUT timestamp: 1"#),
            Err(DecodeError::MissingField("app_id"))
        );
    }
}
