// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! faultier - UART command link

use embassy_rp::uart::{BufferedUartRx, BufferedUartTx, Error as UartError};
use embedded_io_async::{Read, ReadExactError, Write};

use faultier_bin::{AsyncReader, AsyncWriter};

/// Host command link baud rate.
pub const BAUD_RATE: u32 = 115_200;

pub struct LinkReader(pub BufferedUartRx);

impl AsyncReader for LinkReader {
    type Error = ReadExactError<UartError>;

    fn read_exact(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<(), Self::Error>> {
        self.0.read_exact(buf)
    }
}

pub struct LinkWriter(pub BufferedUartTx);

impl AsyncWriter for LinkWriter {
    type Error = UartError;

    async fn write_all(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        self.0.write_all(buf).await?;
        self.0.flush().await
    }
}
