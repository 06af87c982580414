/*!
 * Output Capture
 *
 * Drains a child's stdout and stderr on dedicated tasks so the child never
 * blocks on a full pipe. Lines go to an optional log file and to a bounded
 * in-memory tail used in failure diagnostics.
 */

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn tag(self) -> &'static str {
        match self {
            Stream::Stdout => "out",
            Stream::Stderr => "err",
        }
    }
}

/// Bounded ring of the most recent output lines
#[derive(Debug)]
pub struct OutputTail {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl OutputTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, line: String) {
        let mut lines = self.lines.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Up to `max` most recent lines, oldest first
    pub fn last(&self, max: usize) -> Vec<String> {
        let lines = self.lines.lock();
        let skip = lines.len().saturating_sub(max);
        lines.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

/// Start draining the given pipes. The returned task completes once both
/// pipes have closed and every line has been written.
pub fn spawn_capture<O, E>(
    label: String,
    stdout: Option<O>,
    stderr: Option<E>,
    log_path: Option<PathBuf>,
    tail: Arc<OutputTail>,
) -> JoinHandle<()>
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<(Stream, String)>();

    if let Some(out) = stdout {
        tokio::spawn(drain(out, Stream::Stdout, tx.clone()));
    }
    if let Some(err) = stderr {
        tokio::spawn(drain(err, Stream::Stderr, tx.clone()));
    }
    // Readers hold the only remaining senders; the writer ends when both close.
    drop(tx);

    tokio::spawn(write_lines(label, rx, log_path, tail))
}

async fn drain<R>(pipe: R, stream: Stream, tx: mpsc::UnboundedSender<(Stream, String)>)
where
    R: AsyncRead + Unpin,
{
    let mut segments = BufReader::new(pipe).split(b'\n');
    loop {
        match segments.next_segment().await {
            Ok(Some(raw)) => {
                let line = String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string();
                if tx.send((stream, line)).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(stream = stream.tag(), error = %e, "Output pipe read failed");
                break;
            }
        }
    }
}

async fn write_lines(
    label: String,
    mut rx: mpsc::UnboundedReceiver<(Stream, String)>,
    log_path: Option<PathBuf>,
    tail: Arc<OutputTail>,
) {
    let mut sink = match log_path {
        Some(path) => match open_sink(&path).await {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot open backend log, keeping output in memory only");
                None
            }
        },
        None => None,
    };

    while let Some((stream, line)) = rx.recv().await {
        if line.is_empty() {
            continue;
        }
        debug!(target: "foldhost::backend", process = %label, stream = stream.tag(), "{}", line);

        if let Some(file) = sink.as_mut() {
            let record = format!("[{}] {}\n", stream.tag(), line);
            if let Err(e) = file.write_all(record.as_bytes()).await {
                warn!(error = %e, "Backend log write failed, keeping output in memory only");
                sink = None;
            }
        }
        tail.push(line);
    }

    if let Some(mut file) = sink {
        let _ = file.flush().await;
    }
}

async fn open_sink(path: &std::path::Path) -> std::io::Result<tokio::fs::File> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
}
