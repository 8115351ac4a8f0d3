//! The serial transport (§2, §4.2): a byte-oriented port turned into a
//! stream/sink of [`Frame`]s via [`SerialFrameCodec`]. Framing and retry
//! policy live above this layer, in the link coordinator; this module only
//! knows how to open a port and move frames across it.

use crate::error::{Result, SerialError};
use crate::frame::{self, Frame, ParsedFrame};
use bytes::BytesMut;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tokio_util::codec::{Decoder, Encoder, Framed};

const BAUD_RATE: u32 = 115_200;

/// A transport that moves [`Frame`]s across a physical link. Implemented by
/// [`SerialPort`]; kept as a trait so the link coordinator and its tests can
/// run against an in-memory stand-in instead of a real port.
pub trait SerialBinding {
    fn write(&mut self, frame: Frame) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Reads the next frame, or `None` once the underlying port has closed.
    fn read(&mut self) -> impl std::future::Future<Output = Option<Frame>> + Send;
}

pub struct SerialPort {
    writer: SplitSink<Framed<SerialStream, SerialFrameCodec>, Frame>,
    reader: SplitStream<Framed<SerialStream, SerialFrameCodec>>,
}

impl SerialPort {
    /// Opens `path` at the fixed Z-Wave Serial API baud rate. Reopening
    /// after a port error is the caller's responsibility (§4.2's reopen
    /// policy lives in the link coordinator, not here) — just construct a
    /// new `SerialPort` again.
    pub fn open(path: &str) -> Result<Self> {
        let mut port = tokio_serial::new(path, BAUD_RATE)
            .open_native_async()
            .map_err(|source| SerialError::Configure {
                path: path.to_string(),
                source,
            })?;

        #[cfg(unix)]
        port.set_exclusive(false).map_err(|source| SerialError::Configure {
            path: path.to_string(),
            source,
        })?;

        let (writer, reader) = SerialFrameCodec.framed(port).split();
        Ok(Self { writer, reader })
    }
}

impl SerialBinding for SerialPort {
    async fn write(&mut self, frame: Frame) -> Result<()> {
        self.writer.send(frame).await?;
        Ok(())
    }

    async fn read(&mut self) -> Option<Frame> {
        match self.reader.next().await {
            Some(Ok(frame)) => Some(frame),
            _ => None,
        }
    }
}

struct SerialFrameCodec;

impl Decoder for SerialFrameCodec {
    type Item = Frame;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> std::result::Result<Option<Self::Item>, Self::Error> {
        loop {
            let (parsed, consumed) = frame::try_parse(src);
            match parsed {
                None => return Ok(None),
                Some(ParsedFrame::Garbage { .. }) => {
                    // Resynchronizing: drop the leading junk and keep scanning
                    // the rest of what's already buffered before asking for
                    // more bytes.
                    let _ = src.split_to(consumed);
                    continue;
                }
                Some(ParsedFrame::Frame(frame)) => {
                    let _ = src.split_to(consumed);
                    return Ok(Some(frame));
                }
            }
        }
    }
}

impl Encoder<Frame> for SerialFrameCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> std::result::Result<(), Self::Error> {
        frame::encode(&item, dst);
        Ok(())
    }
}
