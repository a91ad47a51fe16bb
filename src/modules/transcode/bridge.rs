//! Couples the blocking transcode producer to an async upload.
//!
//! The producer encodes on the blocking pool and pushes fixed-size chunks into
//! a channel with room for a single chunk. The upload reads that channel as
//! its body, so an upload that stops reading stalls the encoder instead of
//! letting encoded bytes pile up.

use super::codec::Codec;
use super::engine::{self, TranscodeReport};
use crate::error::{AppError, Result};
use crate::infrastructure::storage::{ByteStream, UploadInfo};
use bytes::{Bytes, BytesMut};
use futures_util::stream;
use std::io::{self, Read, Write};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tracing::debug;

pub const CHUNK_SIZE: usize = 64 * 1024;

/// Blocking [`Write`] end of the bridge.
///
/// Must only be used off the async runtime, since a full channel parks the
/// calling thread.
pub struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
    buf: BytesMut,
    hung_up: bool,
}

impl ChannelWriter {
    pub fn new(tx: mpsc::Sender<io::Result<Bytes>>) -> Self {
        Self {
            tx,
            buf: BytesMut::with_capacity(CHUNK_SIZE),
            hung_up: false,
        }
    }

    /// Whether a send failed because the reader was dropped.
    pub fn hung_up(&self) -> bool {
        self.hung_up
    }

    fn send(&mut self, chunk: Bytes) -> io::Result<()> {
        self.tx.blocking_send(Ok(chunk)).map_err(|_| {
            self.hung_up = true;
            io::Error::new(io::ErrorKind::BrokenPipe, "upload side closed the bridge")
        })
    }

    /// Hands `err` to the reader in place of the remaining bytes, so the
    /// upload aborts instead of storing a truncated image.
    pub fn fail(self, err: &AppError) {
        // The reader may already be gone; then nobody needs to hear about it.
        let _ = self.tx.blocking_send(Err(io::Error::other(err.to_string())));
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        while self.buf.len() >= CHUNK_SIZE {
            let chunk = self.buf.split_to(CHUNK_SIZE).freeze();
            self.send(chunk)?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = self.buf.split().freeze();
        self.send(chunk)
    }
}

/// Reading end of the bridge as an upload body.
pub fn receiver_stream(rx: mpsc::Receiver<io::Result<Bytes>>) -> ByteStream<'static> {
    Box::pin(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }))
}

/// Join handle for a running producer. Its result is the producer's only
/// error slot.
pub struct ProducerHandle {
    task: JoinHandle<Result<TranscodeReport>>,
}

impl ProducerHandle {
    pub async fn finish(self) -> Result<TranscodeReport> {
        self.task
            .await
            .map_err(|e| AppError::Internal(format!("transcode task failed: {e}")))?
    }
}

/// Starts transcoding `raw` and returns the encoded byte stream together with
/// the producer's handle. Must be called from within the runtime.
pub fn spawn_producer(
    raw: ByteStream<'static>,
    codec: Codec,
    k: u32,
) -> (ByteStream<'static>, ProducerHandle) {
    let (tx, rx) = mpsc::channel(1);
    let mut source = SyncIoBridge::new(StreamReader::new(raw));

    let task = tokio::task::spawn_blocking(move || {
        let mut writer = ChannelWriter::new(tx);

        let result = read_source(&mut source).and_then(|input| {
            let report = engine::transcode(&input, codec, k, &mut writer)?;
            writer
                .flush()
                .map_err(|e| AppError::Encode(format!("failed to flush encoded bytes: {e}")))?;
            Ok(report)
        });

        // Whatever the encoder made of the broken pipe, the cause is the upload.
        let result = match result {
            Err(err) if writer.hung_up() => {
                debug!(error = %err, "Upload closed the bridge");
                Err(AppError::BridgeClosed)
            }
            other => other,
        };

        match &result {
            Ok(report) => debug!(?report, "Transcode finished"),
            Err(err) => writer.fail(err),
        }
        result
    });

    (receiver_stream(rx), ProducerHandle { task })
}

fn read_source(source: &mut impl Read) -> Result<Vec<u8>> {
    let mut input = Vec::new();
    source
        .read_to_end(&mut input)
        .map_err(|e| AppError::Transport(format!("failed to read raw image: {e}")))?;
    Ok(input)
}

/// A failed bridge run. `uploaded` is set when the upload had already
/// completed, leaving an object that must not be treated as valid.
#[derive(Debug)]
pub struct BridgeFailure {
    pub error: AppError,
    pub uploaded: Option<UploadInfo>,
}

/// Joins the outcomes of both bridge sides. The producer's error wins, and
/// when both failed the upload error is kept as the secondary cause. A
/// producer that only saw the upload hang up yields to the upload's error.
pub fn combine(
    transcode: Result<TranscodeReport>,
    upload: Result<UploadInfo>,
) -> std::result::Result<(TranscodeReport, UploadInfo), BridgeFailure> {
    match (transcode, upload) {
        (Ok(report), Ok(info)) => Ok((report, info)),
        (Err(error), Ok(info)) => Err(BridgeFailure {
            error,
            uploaded: Some(info),
        }),
        (Ok(_), Err(error)) => Err(BridgeFailure {
            error,
            uploaded: None,
        }),
        (Err(transcode), Err(upload)) => Err(BridgeFailure {
            error: AppError::Pipeline {
                transcode: Box::new(transcode),
                upload: Box::new(upload),
            },
            uploaded: None,
        }),
    }
}
