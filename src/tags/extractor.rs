//! Tag extractor adapter: runs the tag tool over a filtered file set
//!
//! The file list is fed on stdin (`-L -`) from a helper thread, tags are
//! read from stdout line by line as the tool produces them, and a watchdog
//! kills the tool when the caller cancels or the timeout elapses.

use log::{debug, info, warn};
use parking_lot::Mutex;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::{parse_line, TagLine};
use crate::discovery::PathFilter;
use crate::error::{IndexError, Result};

/// Fixed flag set: declaration-level tags, JSON lines, unsorted to stdout, file list on stdin
pub const TAG_TOOL_ARGS: &[&str] = &[
    "--output-format=json",
    "--fields=+nlSt",
    "--kinds-C=+p",
    "--kinds-C++=+p",
    "--sort=no",
    "-f",
    "-",
    "-L",
    "-",
];

const WATCHDOG_POLL: Duration = Duration::from_millis(50);
const STDERR_KEEP: usize = 8 * 1024;

/// Shared flag used to abandon an in-flight extraction
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct TagExtractor {
    tool: String,
    timeout: Option<Duration>,
    skip_dirs: Option<Vec<String>>,
}

impl TagExtractor {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            timeout: None,
            skip_dirs: None,
        }
    }

    /// Zero disables the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn with_skip_dirs(mut self, skip_dirs: Vec<String>) -> Self {
        self.skip_dirs = Some(skip_dirs);
        self
    }

    /// Resolve the tool binary on PATH (or as given, if it is a path)
    pub fn locate(&self) -> Result<PathBuf> {
        which::which(&self.tool).map_err(|e| IndexError::ExternalToolUnavailable {
            tool: self.tool.clone(),
            reason: e.to_string(),
        })
    }

    /// Start extraction for `root`. Output is consumed through the returned stream.
    pub fn extract(&self, root: &Path, group: &str, cancel: &CancelToken) -> Result<TagStream> {
        let mut filter = PathFilter::new(root);
        if let Some(skip_dirs) = &self.skip_dirs {
            filter = filter.with_skip_dirs(skip_dirs.clone());
        }

        let files: Vec<String> = filter
            .candidates()
            .map(|path| {
                path.strip_prefix(root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();

        if files.is_empty() {
            info!("No candidate files under {} for '{}'", root.display(), group);
            return Ok(TagStream::empty());
        }

        let tool = self.locate()?;
        info!(
            "Running {} {} in {} ({} files) for '{}'",
            tool.display(),
            TAG_TOOL_ARGS.join(" "),
            root.display(),
            files.len(),
            group
        );

        let mut child = Command::new(&tool)
            .args(TAG_TOOL_ARGS)
            .current_dir(root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| IndexError::ExternalToolUnavailable {
                tool: tool.display().to_string(),
                reason: e.to_string(),
            })?;

        let (Some(mut stdin), Some(stdout), Some(mut stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(IndexError::ExternalToolUnavailable {
                tool: tool.display().to_string(),
                reason: "failed to attach to tool pipes".to_string(),
            });
        };

        let file_count = files.len();
        let writer = thread::spawn(move || {
            for file in files {
                // Broken pipe means the tool is gone; the exit status tells why
                if writeln!(stdin, "{}", file).is_err() {
                    break;
                }
            }
        });

        let stderr_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf);
            buf.truncate(STDERR_KEEP);
            String::from_utf8_lossy(&buf).trim().to_string()
        });

        let child = Arc::new(Mutex::new(child));
        let abandoned = Arc::new(Mutex::new(None::<String>));
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let watchdog = {
            let child = Arc::clone(&child);
            let abandoned = Arc::clone(&abandoned);
            let cancel = cancel.clone();
            let deadline = self.timeout.map(|t| (Instant::now() + t, t));
            thread::spawn(move || loop {
                match done_rx.recv_timeout(WATCHDOG_POLL) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        let reason = if cancel.is_cancelled() {
                            Some("cancelled by caller".to_string())
                        } else {
                            deadline
                                .filter(|(at, _)| Instant::now() >= *at)
                                .map(|(_, t)| format!("timed out after {:?}", t))
                        };
                        if let Some(reason) = reason {
                            warn!("Terminating tag tool: {}", reason);
                            *abandoned.lock() = Some(reason);
                            let _ = child.lock().kill();
                            break;
                        }
                    }
                }
            })
        };

        Ok(TagStream {
            inner: Some(Running {
                reader: BufReader::new(stdout),
                child,
                abandoned,
                done_tx: Some(done_tx),
                watchdog: Some(watchdog),
                writer: Some(writer),
                stderr: Some(stderr_reader),
            }),
            root: root.to_path_buf(),
            files: file_count,
            tags: 0,
            finished: false,
        })
    }
}

/// One line of tool output, raw and parsed
#[derive(Debug)]
pub struct ExtractedLine {
    pub raw: String,
    pub record: std::result::Result<TagLine, serde_json::Error>,
}

struct Running {
    reader: BufReader<ChildStdout>,
    child: Arc<Mutex<Child>>,
    abandoned: Arc<Mutex<Option<String>>>,
    done_tx: Option<Sender<()>>,
    watchdog: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
    stderr: Option<JoinHandle<String>>,
}

impl Running {
    /// Stop the watchdog, reap the tool, and collect its stderr
    fn reap(&mut self) -> (std::io::Result<std::process::ExitStatus>, String) {
        drop(self.done_tx.take());
        if let Some(handle) = self.watchdog.take() {
            let _ = handle.join();
        }
        let status = self.child.lock().wait();
        if let Some(handle) = self.writer.take() {
            let _ = handle.join();
        }
        let stderr = self
            .stderr
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        (status, stderr)
    }
}

/// Incremental record stream from a running tag tool
///
/// Yields lines as they arrive. The final item is an error when the tool
/// failed, was abandoned, or produced no tags for a non-empty file set.
pub struct TagStream {
    inner: Option<Running>,
    root: PathBuf,
    files: usize,
    tags: usize,
    finished: bool,
}

impl TagStream {
    fn empty() -> Self {
        Self {
            inner: None,
            root: PathBuf::new(),
            files: 0,
            tags: 0,
            finished: true,
        }
    }

    /// Candidate files handed to the tool
    pub fn files(&self) -> usize {
        self.files
    }

    /// Tag records seen so far
    pub fn tags(&self) -> usize {
        self.tags
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        let Some(mut running) = self.inner.take() else {
            return Ok(());
        };
        let (status, stderr) = running.reap();

        if let Some(reason) = running.abandoned.lock().take() {
            return Err(IndexError::ExtractionAbandoned(reason));
        }

        let status = status?;
        if !status.success() {
            if !stderr.is_empty() {
                warn!("tag tool stderr: {}", stderr);
            }
            return Err(IndexError::ExternalToolError {
                code: status.code(),
                stderr,
            });
        }

        if !stderr.is_empty() {
            debug!("tag tool stderr: {}", stderr);
        }

        if self.tags == 0 && self.files > 0 {
            return Err(IndexError::EmptyResult {
                root: self.root.clone(),
                files: self.files,
            });
        }
        Ok(())
    }
}

impl Iterator for TagStream {
    type Item = Result<ExtractedLine>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let running = self.inner.as_mut()?;

        let mut buf = Vec::new();
        match running.reader.read_until(b'\n', &mut buf) {
            Ok(0) => self.finish().err().map(Err),
            Ok(_) => {
                let raw = String::from_utf8_lossy(&buf).trim_end().to_string();
                let record = parse_line(&raw);
                if matches!(record, Ok(TagLine::Tag(_))) {
                    self.tags += 1;
                }
                Some(Ok(ExtractedLine { raw, record }))
            }
            Err(e) => {
                let _ = running.child.lock().kill();
                match self.finish() {
                    Err(IndexError::ExtractionAbandoned(reason)) => {
                        Some(Err(IndexError::ExtractionAbandoned(reason)))
                    }
                    _ => Some(Err(IndexError::Io(e))),
                }
            }
        }
    }
}

impl Drop for TagStream {
    // Consumer walked away mid-stream: the tool must not outlive it
    fn drop(&mut self) {
        if let Some(mut running) = self.inner.take() {
            let _ = running.child.lock().kill();
            let _ = running.reap();
        }
    }
}
