// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Build-context packager.
//!
//! Turns a function's source directory into a tar archive for the engine's
//! image build. The archive is produced on a blocking worker and handed over
//! in bounded chunks, so the tree is never held in memory as a whole.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use walkdir::WalkDir;

/// Size of each chunk handed to the consumer.
const CHUNK_SIZE: usize = 64 * 1024;
/// Chunks buffered between the packaging worker and the consumer.
const CHANNEL_DEPTH: usize = 8;

/// Streamed archive chunks. A packaging failure is also delivered in-band
/// so an upload in progress aborts.
pub type ContextStream = ReceiverStream<io::Result<Bytes>>;

/// What the packaging worker wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArchiveSummary {
    pub entries: usize,
    pub bytes: u64,
}

/// Handle on the packaging worker of a [`BuildContext`].
#[derive(Debug)]
pub struct Packaging {
    root: PathBuf,
    task: JoinHandle<io::Result<ArchiveSummary>>,
}

impl Packaging {
    /// Wait for the worker and return its outcome.
    ///
    /// Dropping the stream first makes the worker stop with `BrokenPipe`.
    pub async fn finish(self) -> io::Result<ArchiveSummary> {
        match self.task.await {
            Ok(result) => result,
            Err(join_err) => Err(io::Error::other(format!(
                "packaging worker for {} failed: {}",
                self.root.display(),
                join_err
            ))),
        }
    }
}

/// A build context being packaged from a source directory.
#[derive(Debug)]
pub struct BuildContext {
    stream: ContextStream,
    packaging: Packaging,
}

impl BuildContext {
    /// Start packaging `root`. Must be called within a Tokio runtime.
    ///
    /// Entry paths are relative to `root`. Traversal is sorted by file name;
    /// directories, regular files and symlinks are archived, symlinks as
    /// links rather than their targets.
    pub fn package(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);

        let worker_root = root.clone();
        let task = tokio::task::spawn_blocking(move || {
            let result = write_archive(&worker_root, ChunkWriter::new(tx.clone()));
            if let Err(e) = &result {
                // The consumer may already be gone; nothing else to do then.
                let _ = tx.blocking_send(Err(io::Error::new(e.kind(), e.to_string())));
            }
            result
        });

        Self {
            stream: ReceiverStream::new(rx),
            packaging: Packaging { root, task },
        }
    }

    /// Split into the chunk stream and the worker handle.
    pub fn into_parts(self) -> (ContextStream, Packaging) {
        (self.stream, self.packaging)
    }

    /// Collect the whole archive into memory. Intended for small sources.
    pub async fn into_bytes(self) -> io::Result<Vec<u8>> {
        let (mut stream, packaging) = self.into_parts();
        let mut archive = Vec::new();
        let mut in_band_error = None;

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => archive.extend_from_slice(&bytes),
                Err(e) => {
                    in_band_error = Some(e);
                    break;
                }
            }
        }
        drop(stream);

        let summary = packaging.finish().await;
        match (summary, in_band_error) {
            (Err(e), _) | (Ok(_), Some(e)) => Err(e),
            (Ok(_), None) => Ok(archive),
        }
    }
}

/// Walk `root` and write every entry into a tar archive on `sink`.
fn write_archive(root: &Path, sink: ChunkWriter) -> io::Result<ArchiveSummary> {
    let metadata = std::fs::metadata(root)?;
    if !metadata.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a directory", root.display()),
        ));
    }

    let mut builder = tar::Builder::new(sink);
    builder.follow_symlinks(false);
    let mut entries = 0;

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(walk_error)?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let kind = entry.file_type();
        if kind.is_dir() || kind.is_file() || kind.is_symlink() {
            builder.append_path_with_name(entry.path(), relative)?;
            entries += 1;
        } else {
            tracing::debug!(path = %entry.path().display(), "Skipping special file in build context");
        }
    }

    let mut sink = builder.into_inner()?;
    sink.flush()?;

    tracing::debug!(
        root = %root.display(),
        entries,
        bytes = sink.written,
        "Build context packaged"
    );

    Ok(ArchiveSummary {
        entries,
        bytes: sink.written,
    })
}

fn walk_error(err: walkdir::Error) -> io::Error {
    let path = err.path().map(|p| p.display().to_string());
    match err.into_io_error() {
        Some(io_err) => match path {
            Some(path) => io::Error::new(io_err.kind(), format!("{}: {}", path, io_err)),
            None => io_err,
        },
        None => io::Error::other("filesystem loop in build context"),
    }
}

/// `Write` adapter that forwards fixed-size chunks over a channel.
struct ChunkWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
    buf: BytesMut,
    written: u64,
}

impl ChunkWriter {
    fn new(tx: mpsc::Sender<io::Result<Bytes>>) -> Self {
        Self {
            tx,
            buf: BytesMut::with_capacity(CHUNK_SIZE),
            written: 0,
        }
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = self.buf.split().freeze();
        self.tx.blocking_send(Ok(chunk)).map_err(|_| {
            io::Error::new(io::ErrorKind::BrokenPipe, "build context consumer went away")
        })
    }
}

impl Write for ChunkWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let take = data.len().min(CHUNK_SIZE - self.buf.len());
        self.buf.extend_from_slice(&data[..take]);
        self.written += take as u64;
        if self.buf.len() == CHUNK_SIZE {
            self.send_buffered()?;
        }
        Ok(take)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}
