// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! faultier-pio - Binary API for the glitcher
//!
//! Serves [`faultier_bin`] frames: each received frame is decoded as a
//! [`Request`], handled against a [`Glitcher`], and answered with exactly
//! one [`Response`] frame.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use faultier_bin::{
    AsyncReader, AsyncWriter, FrameReader, MAX_CAPTURE_CHUNK, MAX_PAYLOAD_LEN, ParseError,
    Request, Response, VERSION, decode_payload, send_response,
};

use crate::capture::{Capture, Indicator};
use crate::lane::Lane;
use crate::orchestrator::{Glitcher, RunResult};
use crate::Clock;

// Log every X binary API calls
const API_CALL_LOG_INTERVAL: usize = 1000;

/// Stream failure which ends [`Api::serve()`].
#[derive(Debug)]
pub enum ServeError<R, W> {
    Read(R),
    Write(W),
}

/// Represents a binary API instance.
///
/// Create, then call [`Self::serve()`] to start serving requests.  `serve()`
/// takes over the calling task until the stream fails.
pub struct Api {
    /// The number of binary API calls handled by this instance.
    pub binary_api_calls: usize,
    firmware: String,
    frames: FrameReader,
}

impl Api {
    /// Creates a new instance of the binary API, reporting `firmware` in
    /// [`Response::Hello`].
    pub fn new(firmware: impl Into<String>) -> Self {
        Api {
            binary_api_calls: 0,
            firmware: firmware.into(),
            frames: FrameReader::new(MAX_PAYLOAD_LEN),
        }
    }

    /// Serves requests until the stream fails.
    pub async fn serve<L, C, I, K, R, W>(
        &mut self,
        glitcher: &mut Glitcher<L, C, I>,
        clock: &mut K,
        reader: &mut R,
        writer: &mut W,
    ) -> ServeError<R::Error, W::Error>
    where
        L: Lane,
        C: Capture,
        I: Indicator,
        K: Clock,
        R: AsyncReader,
        W: AsyncWriter,
    {
        info!("Exec:  Binary API serving");
        loop {
            if let Err(e) = self.serve_frame(glitcher, clock, reader, writer).await {
                info!(
                    "Note:  Binary API handled {} calls before stream failure",
                    self.binary_api_calls
                );
                break e;
            }
        }
    }

    /// Receives one frame and sends its response.
    ///
    /// Returns:
    /// - `Ok(Response)`: The response sent.  Protocol errors are answered
    ///   with [`Response::Error`] and do not end serving.
    /// - `Err(ServeError)`: If the stream failed.
    pub async fn serve_frame<L, C, I, K, R, W>(
        &mut self,
        glitcher: &mut Glitcher<L, C, I>,
        clock: &mut K,
        reader: &mut R,
        writer: &mut W,
    ) -> Result<Response, ServeError<R::Error, W::Error>>
    where
        L: Lane,
        C: Capture,
        I: Indicator,
        K: Clock,
        R: AsyncReader,
        W: AsyncWriter,
    {
        let response = match self.frames.recv(reader).await {
            Ok(payload) => match decode_payload::<Request>(&payload) {
                Ok(request) => self.handle(glitcher, clock, request).await,
                Err(e) => {
                    warn!("Error: Binary API received undecodable request");
                    Response::error(e.to_string())
                }
            },
            Err(ParseError::Protocol(e)) => {
                warn!("Error: Binary API frame rejected: {e}");
                Response::error(e.to_string())
            }
            Err(ParseError::Transport(e)) => return Err(ServeError::Read(e)),
        };

        reply::<R::Error, W>(writer, &response).await?;
        Ok(response)
    }

    /// Handles a single decoded request.
    pub async fn handle<L, C, I, K>(
        &mut self,
        glitcher: &mut Glitcher<L, C, I>,
        clock: &mut K,
        request: Request,
    ) -> Response
    where
        L: Lane,
        C: Capture,
        I: Indicator,
        K: Clock,
    {
        self.binary_api_calls += 1;
        if self.binary_api_calls % API_CALL_LOG_INTERVAL == 0 {
            info!("Note:  Binary API handled {} calls", self.binary_api_calls);
        }
        debug!("Exec:  Binary API request {request}");

        let response = match request {
            Request::Hello => Response::Hello {
                version: VERSION,
                firmware: self.firmware.clone(),
            },
            Request::ConfigureGlitcher(settings) => match glitcher.configure(&settings) {
                Ok(()) => Response::Ok,
                Err(e) => Response::error(e.message()),
            },
            Request::ConfigureCapture(settings) => match glitcher.configure_capture(&settings) {
                Ok(()) => Response::Ok,
                Err(e) => Response::error(e.message()),
            },
            Request::Glitch => match glitcher.run(clock).await {
                Ok(RunResult::Ok) => Response::Ok,
                Ok(RunResult::TriggerTimeout) => Response::TriggerTimeout,
                Err(e) => Response::error(e.message()),
            },
            Request::ReadCapture { offset, count } => {
                read_capture(glitcher.capture().samples(), offset, count)
            }
            Request::GetConfiguration => {
                let timeouts = glitcher.timeouts();
                Response::Configuration {
                    config: glitcher.configuration().clone(),
                    trigger_timeout_ms: timeouts.trigger.as_millis() as u32,
                    completion_timeout_ms: timeouts.completion.as_millis() as u32,
                }
            }
        };

        debug!("OK:    Binary API response {response}");
        response
    }
}

// Sends a response, falling back to an error response if it cannot be
// encoded.
async fn reply<R, W: AsyncWriter>(
    writer: &mut W,
    response: &Response,
) -> Result<(), ServeError<R, W::Error>> {
    match send_response(writer, response).await {
        Ok(()) => Ok(()),
        Err(ParseError::Transport(e)) => Err(ServeError::Write(e)),
        Err(ParseError::Protocol(e)) => {
            warn!("Error: Binary API failed to send {response}: {e}");
            match send_response(writer, &Response::error(e.to_string())).await {
                Err(ParseError::Transport(e)) => Err(ServeError::Write(e)),
                _ => Ok(()),
            }
        }
    }
}

// Returns up to `count` samples from `offset`, limited to a single chunk.
fn read_capture(samples: &[u8], offset: u32, count: u16) -> Response {
    let total = samples.len() as u32;
    if offset > total {
        return Response::error("Offset beyond captured samples");
    }
    let count = count.min(MAX_CAPTURE_CHUNK) as u32;
    let end = offset.saturating_add(count).min(total);
    let chunk: Vec<u8> = samples[offset as usize..end as usize].to_vec();
    Response::CaptureData {
        offset,
        total,
        samples: chunk,
    }
}
