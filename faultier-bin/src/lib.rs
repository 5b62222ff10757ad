// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! faultier-bin - Faultier's binary command API shared server/client
//! constants and types
//!
//! Every message, in either direction, is a frame:
//!
//! ```text
//! +----------------+----------------------+---------------------+
//! | magic "FLTR"   | length (u32, LE)     | payload (length)    |
//! | 4 bytes        | 4 bytes              | JSON encoded        |
//! +----------------+----------------------+---------------------+
//! ```
//!
//! Requests carry a [`Request`] payload and responses a [`Response`]
//! payload, both of at most [`MAX_PAYLOAD_LEN`] bytes.
//!
//! After a frame with a bad magic or an oversized length, [`FrameReader`]
//! discards input until it next sees the magic, so that a single corrupt
//! frame does not wedge the link.
//!
//! This crate is `no_std` and platform agnostic.

#![no_std]

extern crate alloc;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use faultier_core::{CaptureSettings, GlitchConfiguration, GlitcherSettings};

/// Frame magic.
pub const MAGIC: [u8; 4] = *b"FLTR";

/// Frame header length: magic plus length.
pub const HEADER_LEN: usize = 8;

/// Maximum payload length, in either direction.
pub const MAX_PAYLOAD_LEN: u32 = 256;

/// Maximum number of capture samples returned by a single
/// [`Request::ReadCapture`].  A full chunk of `255` samples, with the
/// largest offset and total, encodes to 253 bytes.
pub const MAX_CAPTURE_CHUNK: u16 = 46;

// Binary API version
pub const VERSION: u8 = 0x01;

/// Requests sent by a client to faultier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    /// Returns [`Response::Hello`].
    Hello,

    /// Replaces the glitch configuration.
    ConfigureGlitcher(GlitcherSettings),

    /// Changes analog capture settings.  Sample counts over
    /// [`faultier_core::MAX_ADC_SAMPLES`] are rejected.
    ConfigureCapture(CaptureSettings),

    /// Performs a glitch run using the active configuration.
    Glitch,

    /// Reads back captured samples, starting at `offset`.
    ReadCapture { offset: u32, count: u16 },

    /// Returns [`Response::Configuration`].
    GetConfiguration,
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Hello => write!(f, "Hello"),
            Request::ConfigureGlitcher(_) => write!(f, "Configure Glitcher"),
            Request::ConfigureCapture(_) => write!(f, "Configure Capture"),
            Request::Glitch => write!(f, "Glitch"),
            Request::ReadCapture { .. } => write!(f, "Read Capture"),
            Request::GetConfiguration => write!(f, "Get Configuration"),
        }
    }
}

/// Responses sent by faultier.  Exactly one is sent per received frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Ok,
    Error {
        message: String,
    },

    /// The trigger condition was not seen before the trigger timeout.
    TriggerTimeout,
    CaptureData {
        offset: u32,
        total: u32,
        samples: Vec<u8>,
    },
    Hello {
        version: u8,
        firmware: String,
    },
    Configuration {
        #[serde(with = "config_fields")]
        config: GlitchConfiguration,
        trigger_timeout_ms: u32,
        completion_timeout_ms: u32,
    },
}

// Carries a configuration as a positional array, so that a
// `Response::Configuration` always fits in a single frame.
mod config_fields {
    use faultier_core::{
        GlitchConfiguration, GlitchOutput, TriggerPull, TriggerSource, TriggerType,
    };
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    type Fields = (
        TriggerType,
        TriggerSource,
        TriggerPull,
        GlitchOutput,
        GlitchOutput,
        u32,
        u32,
        u32,
        u32,
    );

    pub fn serialize<S: Serializer>(
        config: &GlitchConfiguration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let fields: Fields = (
            config.trigger_type,
            config.trigger_source,
            config.trigger_pull,
            config.glitch_output,
            config.power_cycle_output,
            config.power_cycle_length,
            config.delay_cycles,
            config.pulse_width_cycles,
            config.adc_sample_count,
        );
        fields.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<GlitchConfiguration, D::Error> {
        let (
            trigger_type,
            trigger_source,
            trigger_pull,
            glitch_output,
            power_cycle_output,
            power_cycle_length,
            delay_cycles,
            pulse_width_cycles,
            adc_sample_count,
        ) = Fields::deserialize(deserializer)?;
        Ok(GlitchConfiguration {
            trigger_type,
            trigger_source,
            trigger_pull,
            glitch_output,
            power_cycle_output,
            power_cycle_length,
            delay_cycles,
            pulse_width_cycles,
            adc_sample_count,
        })
    }
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok => write!(f, "OK"),
            Response::Error { message } => write!(f, "Error ({message})"),
            Response::TriggerTimeout => write!(f, "Trigger Timeout"),
            Response::CaptureData { samples, .. } => {
                write!(f, "Capture Data ({} samples)", samples.len())
            }
            Response::Hello { .. } => write!(f, "Hello"),
            Response::Configuration { .. } => write!(f, "Configuration"),
        }
    }
}

/// Type used to represent errors that can occur in sending or receiving
/// frames over the binary API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame did not start with [`MAGIC`].  The bytes received instead are
    /// included.
    Magic([u8; 4]),

    /// Frame length exceeds the maximum for this direction.
    Length(u32),

    /// Payload could not be decoded.
    Payload,

    /// Payload could not be encoded.
    Encode,
}

impl ProtocolError {
    /// Returns a string representation of the error.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolError::Magic(_) => "Bad frame magic",
            ProtocolError::Length(_) => "Frame too long",
            ProtocolError::Payload => "Invalid payload",
            ProtocolError::Encode => "Encode failure",
        }
    }

    /// Returns true if the reader must search for the next frame magic
    /// before reading another frame.
    pub fn requires_resync(&self) -> bool {
        matches!(self, ProtocolError::Magic(_) | ProtocolError::Length(_))
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Magic(magic) => write!(f, "{}: {magic:02X?}", self.as_str()),
            ProtocolError::Length(len) => write!(f, "{}: {len}", self.as_str()),
            _ => write!(f, "{}", self.as_str()),
        }
    }
}

/// Type used to represent errors that can occur in parsing received frames
/// over the binary API.
#[derive(Debug)]
pub enum ParseError<T> {
    Transport(T),
    Protocol(ProtocolError),
}

impl<T> From<ProtocolError> for ParseError<T> {
    fn from(e: ProtocolError) -> Self {
        ParseError::Protocol(e)
    }
}

impl<T> ParseError<T> {
    fn transport(e: T) -> Self {
        ParseError::Transport(e)
    }
}

/// Async reader trait for reading data from a stream
pub trait AsyncReader {
    type Error;
    fn read_exact(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<(), Self::Error>>;
}

/// Async writer trait for writing data to a stream
pub trait AsyncWriter {
    type Error;
    fn write_all(&mut self, buf: &[u8]) -> impl Future<Output = Result<(), Self::Error>>;
}

/// Parses a frame header.
///
/// Arguments:
/// - `header`: The first [`HEADER_LEN`] bytes of the frame.
/// - `max_len`: The largest payload length accepted.
///
/// Returns:
/// - `Ok(u32)`: The payload length.
/// - `Err(ProtocolError::Magic)`: If the magic is wrong.
/// - `Err(ProtocolError::Length)`: If the length exceeds `max_len`.
pub fn parse_header(header: &[u8; HEADER_LEN], max_len: u32) -> Result<u32, ProtocolError> {
    let magic = [header[0], header[1], header[2], header[3]];
    if magic != MAGIC {
        return Err(ProtocolError::Magic(magic));
    }
    parse_length(&[header[4], header[5], header[6], header[7]], max_len)
}

fn parse_length(bytes: &[u8; 4], max_len: u32) -> Result<u32, ProtocolError> {
    let len = u32::from_le_bytes(*bytes);
    if len > max_len {
        debug!("Frame length {len} exceeds {max_len}");
        return Err(ProtocolError::Length(len));
    }
    Ok(len)
}

/// Encodes `message` as a complete frame.
///
/// Returns:
/// - `Ok(Vec<u8>)`: The header followed by the payload.
/// - `Err(ProtocolError::Encode)`: If serialization failed.
/// - `Err(ProtocolError::Length)`: If the payload exceeds `max_len`.
pub fn encode_frame<T: Serialize>(message: &T, max_len: u32) -> Result<Vec<u8>, ProtocolError> {
    let payload = serde_json::to_vec(message).map_err(|_| ProtocolError::Encode)?;
    let len = payload.len() as u32;
    if len > max_len {
        return Err(ProtocolError::Length(len));
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&MAGIC);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decodes a frame payload.
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ProtocolError> {
    serde_json::from_slice(payload).map_err(|e| {
        debug!("Payload decode failed: {e}");
        ProtocolError::Payload
    })
}

/// Reads frames from a stream, resynchronizing on the frame magic after a
/// corrupt header.
pub struct FrameReader {
    max_len: u32,
    resync: bool,

    // Bytes already read from the stream which must be scanned for the magic
    // before reading any more.
    pending: heapless::Deque<u8, HEADER_LEN>,
}

impl FrameReader {
    /// Creates a frame reader accepting payloads up to `max_len` bytes.
    pub fn new(max_len: u32) -> Self {
        FrameReader {
            max_len,
            resync: false,
            pending: heapless::Deque::new(),
        }
    }

    /// Returns true if the reader is discarding input until the next frame
    /// magic.
    pub fn is_resyncing(&self) -> bool {
        self.resync
    }

    /// Used by a binary API server to receive the next complete frame
    /// payload.
    ///
    /// Arguments:
    /// - `reader`: A mutable reference to a reader that implements the
    ///   `AsyncReader` trait
    ///
    /// Returns:
    /// - `Ok(Vec<u8>)`: The frame payload.
    /// - `Err(ParseError::Protocol)`: If the header was bad.  The reader
    ///   resynchronizes on the next call.
    /// - `Err(ParseError::Transport)`: If the stream failed.
    pub async fn recv<R: AsyncReader>(
        &mut self,
        reader: &mut R,
    ) -> Result<Vec<u8>, ParseError<R::Error>> {
        let len = if self.resync {
            self.seek_magic(reader).await?;
            self.resync = false;
            let mut len_buf = [0u8; 4];
            self.fill(reader, &mut len_buf).await?;
            parse_length(&len_buf, self.max_len).inspect_err(|_| self.resync = true)?
        } else {
            let mut header = [0u8; HEADER_LEN];
            self.fill(reader, &mut header).await?;
            parse_header(&header, self.max_len).inspect_err(|e| {
                self.resync = true;
                if let ProtocolError::Magic(_) = e {
                    // The real magic may start part way through this header
                    for byte in &header[1..] {
                        let _ = self.pending.push_back(*byte);
                    }
                }
            })?
        };

        let mut payload = vec![0u8; len as usize];
        self.fill(reader, &mut payload)
            .await
            .inspect_err(|_| debug!("Failed to read payload bytes {len}"))?;
        trace!("Received frame len: {len}");
        Ok(payload)
    }

    // Fills `buf`, taking any pending bytes before reading from the stream.
    async fn fill<R: AsyncReader>(
        &mut self,
        reader: &mut R,
        buf: &mut [u8],
    ) -> Result<(), ParseError<R::Error>> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.pending.pop_front() {
                Some(byte) => {
                    buf[filled] = byte;
                    filled += 1;
                }
                None => break,
            }
        }
        if filled < buf.len() {
            reader
                .read_exact(&mut buf[filled..])
                .await
                .map_err(ParseError::transport)?;
        }
        Ok(())
    }

    // Discards input until the frame magic has been consumed.
    async fn seek_magic<R: AsyncReader>(
        &mut self,
        reader: &mut R,
    ) -> Result<(), ParseError<R::Error>> {
        let mut window = [0u8; 4];
        let mut seen = 0usize;
        let mut discarded = 0usize;
        loop {
            let mut buf = [0u8; 1];
            self.fill(reader, &mut buf).await?;
            let byte = buf[0];

            window.copy_within(1.., 0);
            window[3] = byte;
            seen += 1;
            if seen >= 4 && window == MAGIC {
                debug!("Resynchronized after discarding {discarded} bytes");
                return Ok(());
            }
            if seen >= 4 {
                discarded += 1;
            }
        }
    }
}

/// Sends `response` as a single frame.
pub async fn send_response<W: AsyncWriter>(
    writer: &mut W,
    response: &Response,
) -> Result<(), ParseError<W::Error>> {
    let frame = encode_frame(response, MAX_PAYLOAD_LEN)?;
    writer
        .write_all(&frame)
        .await
        .map_err(ParseError::transport)
}
