//! # Message Input and Output
//!
//! The call engine pulls request messages from a [`MessageParser`] and renders each response
//! with a [`MessageFormatter`]. Both are encoding-agnostic traits; this module provides JSON
//! implementations built on prost-reflect's canonical Protobuf JSON mapping.
use prost_reflect::{DeserializeOptions, DynamicMessage, ReflectMessage, SerializeOptions};
use serde_json::ser::PrettyFormatter;
use std::future::Future;
use std::io::{self, Read};
use std::thread;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid JSON input: '{0}'")]
    Json(#[source] serde_json::Error),
    #[error("JSON does not match message '{message}': '{source}'")]
    Schema {
        message: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to render message '{message}': '{source}'")]
pub struct FormatError {
    message: String,
    source: serde_json::Error,
}

/// A source of request messages.
pub trait MessageParser {
    /// Fills `message`, which arrives zero-valued, with the next input message.
    ///
    /// Returns `Ok(false)` once the input is exhausted. Running out of input is not an error.
    fn next_message(
        &mut self,
        message: &mut DynamicMessage,
    ) -> impl Future<Output = Result<bool, ParseError>>;
}

/// Renders one response message as text.
pub trait MessageFormatter {
    fn format(&self, message: &DynamicMessage) -> Result<String, FormatError>;
}

type JsonValues<R> =
    serde_json::StreamDeserializer<'static, serde_json::de::IoRead<R>, serde_json::Value>;

/// Reads a sequence of JSON documents, one per message.
///
/// Documents may be separated by whitespace or simply concatenated. Reads happen on the
/// calling task, so `R` should never block; see [`BackgroundJsonParser`] for stdin and pipes.
pub struct JsonMessageParser<R: Read> {
    values: JsonValues<R>,
    options: DeserializeOptions,
}

impl<R: Read> JsonMessageParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            values: serde_json::Deserializer::from_reader(reader).into_iter(),
            options: DeserializeOptions::new(),
        }
    }

    /// Ignore JSON fields the message does not declare instead of failing.
    pub fn allow_unknown_fields(mut self, allow: bool) -> Self {
        self.options = DeserializeOptions::new().deny_unknown_fields(!allow);
        self
    }
}

impl<R: Read> MessageParser for JsonMessageParser<R> {
    async fn next_message(&mut self, message: &mut DynamicMessage) -> Result<bool, ParseError> {
        match self.values.next() {
            None => Ok(false),
            Some(value) => decode(value, message, &self.options).map(|_| true),
        }
    }
}

/// Like [`JsonMessageParser`], but the reader is drained on a dedicated thread.
///
/// Waiting for the next document suspends the task instead of blocking it, so a call reading
/// from a terminal or a pipe can still be cancelled or time out. Documents are read ahead of
/// the call by a small bounded amount.
pub struct BackgroundJsonParser {
    values: mpsc::Receiver<serde_json::Result<serde_json::Value>>,
    options: DeserializeOptions,
}

impl BackgroundJsonParser {
    const READ_AHEAD: usize = 16;

    /// Starts reading `reader` on a new thread. The thread stops at end of input, at the
    /// first malformed document, or once the parser is dropped.
    pub fn spawn<R: Read + Send + 'static>(reader: R) -> io::Result<Self> {
        let (sender, values) = mpsc::channel(Self::READ_AHEAD);

        thread::Builder::new()
            .name("dynrpc-input".into())
            .spawn(move || {
                let documents: JsonValues<R> =
                    serde_json::Deserializer::from_reader(reader).into_iter();
                for document in documents {
                    let malformed = document.is_err();
                    if sender.blocking_send(document).is_err() || malformed {
                        break;
                    }
                }
            })?;

        Ok(Self {
            values,
            options: DeserializeOptions::new(),
        })
    }

    /// Ignore JSON fields the message does not declare instead of failing.
    pub fn allow_unknown_fields(mut self, allow: bool) -> Self {
        self.options = DeserializeOptions::new().deny_unknown_fields(!allow);
        self
    }
}

impl MessageParser for BackgroundJsonParser {
    async fn next_message(&mut self, message: &mut DynamicMessage) -> Result<bool, ParseError> {
        match self.values.recv().await {
            None => Ok(false),
            Some(value) => decode(value, message, &self.options).map(|_| true),
        }
    }
}

/// Maps one JSON document onto the schema of `message`.
fn decode(
    value: serde_json::Result<serde_json::Value>,
    message: &mut DynamicMessage,
    options: &DeserializeOptions,
) -> Result<(), ParseError> {
    let value = value.map_err(ParseError::Json)?;

    let descriptor = message.descriptor();
    *message = DynamicMessage::deserialize_with_options(descriptor.clone(), value, options)
        .map_err(|source| ParseError::Schema {
            message: descriptor.full_name().to_string(),
            source,
        })?;

    Ok(())
}

/// Renders messages as JSON. Output is compact unless [`Self::multiline`] is set.
#[derive(Debug, Clone, Default)]
pub struct JsonMessageFormatter {
    multiline: bool,
    emit_defaults: bool,
}

impl JsonMessageFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretty-print with two space indentation.
    pub fn multiline(mut self, multiline: bool) -> Self {
        self.multiline = multiline;
        self
    }

    /// Also render fields holding their default value.
    pub fn emit_defaults(mut self, emit_defaults: bool) -> Self {
        self.emit_defaults = emit_defaults;
        self
    }
}

impl MessageFormatter for JsonMessageFormatter {
    fn format(&self, message: &DynamicMessage) -> Result<String, FormatError> {
        let options = SerializeOptions::new().skip_default_fields(!self.emit_defaults);
        let mut out = Vec::new();

        let result = if self.multiline {
            let formatter = PrettyFormatter::with_indent(b"  ");
            let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
            message.serialize_with_options(&mut serializer, &options)
        } else {
            let mut serializer = serde_json::Serializer::new(&mut out);
            message.serialize_with_options(&mut serializer, &options)
        };

        result.map_err(|source| FormatError {
            message: message.descriptor().full_name().to_string(),
            source,
        })?;

        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}
