mod command;
mod progress;
mod signal;

use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command as ProcessCommand, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, warn};
use url::Url;

pub(crate) use command::CommandOptions;
pub(crate) use progress::{ConsoleProgress, ProgressSink, ProgressTracker};
pub(crate) use signal::CancelFlag;

use crate::media::MediaKind;
use crate::paths::part_path;

/// Upper bound on how long a silent transcoder can delay cancellation.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub(crate) struct DownloadTarget {
    pub(crate) destination: PathBuf,
    pub(crate) stream_url: Url,
    pub(crate) kind: MediaKind,
}

#[derive(Debug, Error)]
pub(crate) enum TranscodeError {
    #[error("transcoder exited with code {exit_code}")]
    Failed { exit_code: i32, stderr: String },
    #[error("transcode interrupted by operator")]
    Cancelled,
    #[error("failed to launch transcoder {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl TranscodeError {
    pub(crate) fn is_recoverable(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

pub(crate) trait Transcoder {
    /// Produces `target.destination` or leaves it untouched.
    fn transcode(&mut self, target: &DownloadTarget) -> Result<PathBuf, TranscodeError>;
}

/// Temporary output next to the destination. Removed on drop unless promoted.
#[derive(Debug)]
struct PartFile {
    path: PathBuf,
    promoted: bool,
}

impl PartFile {
    fn new(destination: &Path) -> Self {
        Self {
            path: part_path(destination),
            promoted: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn promote(mut self, destination: &Path) -> io::Result<()> {
        fs::rename(&self.path, destination)?;
        self.promoted = true;
        Ok(())
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.promoted {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed partial output"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to remove partial output")
            }
        }
    }
}

/// Runs ffmpeg for one unit and watches it until it exits.
pub(crate) struct TranscodeSupervisor<P: ProgressSink> {
    binary: PathBuf,
    options: CommandOptions,
    cancel: CancelFlag,
    progress: P,
}

impl<P: ProgressSink> TranscodeSupervisor<P> {
    pub(crate) fn new(
        binary: PathBuf,
        options: CommandOptions,
        cancel: CancelFlag,
        progress: P,
    ) -> Self {
        Self {
            binary,
            options,
            cancel,
            progress,
        }
    }

    #[cfg(test)]
    pub(crate) fn progress(&self) -> &P {
        &self.progress
    }

    fn spawn(&self, target: &DownloadTarget, part: &PartFile) -> Result<Child, TranscodeError> {
        let args = command::transcode_args(target.stream_url.as_str(), part.path(), self.options);
        debug!(
            binary = %self.binary.display(),
            args = ?args,
            "launching transcoder"
        );

        ProcessCommand::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| TranscodeError::Spawn {
                path: self.binary.clone(),
                source,
            })
    }

    /// Forwards progress lines until stdout closes, polling the cancel flag
    /// between lines and while the transcoder is silent. Returns `false` when
    /// cancellation was observed.
    fn pump_progress(&mut self, lines: Option<Receiver<String>>) -> bool {
        let Some(lines) = lines else {
            return !self.cancel.is_cancelled();
        };

        let mut tracker = ProgressTracker::default();
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            match lines.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(line) => {
                    if let Some(seconds) = tracker.observe(&line) {
                        self.progress.report(seconds);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        !self.cancel.is_cancelled()
    }
}

/// Reads stdout on a helper thread; the channel closes at end of stream.
fn forward_stdout(child: &mut Child) -> Option<Receiver<String>> {
    let stdout = child.stdout.take()?;
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || read_lines(stdout, &sender));
    Some(receiver)
}

fn read_lines(stdout: ChildStdout, sender: &mpsc::Sender<String>) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => return,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).into_owned();
                if sender.send(line).is_err() {
                    return;
                }
            }
            Err(err) => {
                warn!(error = %err, "failed reading transcoder progress");
                return;
            }
        }
    }
}

fn drain_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    let mut stderr = child.stderr.take()?;
    Some(thread::spawn(move || {
        let mut raw = Vec::new();
        let _ = stderr.read_to_end(&mut raw);
        String::from_utf8_lossy(&raw).trim().to_string()
    }))
}

fn kill_child(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!(error = %err, "transcoder already exited");
    }
    let _ = child.wait();
}

impl<P: ProgressSink> Transcoder for TranscodeSupervisor<P> {
    fn transcode(&mut self, target: &DownloadTarget) -> Result<PathBuf, TranscodeError> {
        if self.cancel.is_cancelled() {
            return Err(TranscodeError::Cancelled);
        }

        let destination = target.destination.as_path();
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                TranscodeError::io(format!("failed to create {}", parent.display()), err)
            })?;
        }

        let part = PartFile::new(destination);
        let mut child = self.spawn(target, &part)?;
        let stderr = drain_stderr(&mut child);
        let lines = forward_stdout(&mut child);

        let completed = self.pump_progress(lines);
        self.progress.finish();
        if !completed {
            warn!(kind = %target.kind, path = %destination.display(), "download interrupted");
            kill_child(&mut child);
            return Err(TranscodeError::Cancelled);
        }

        let status = child
            .wait()
            .map_err(|err| TranscodeError::io("failed waiting on transcoder", err))?;
        if self.cancel.is_cancelled() {
            warn!(kind = %target.kind, path = %destination.display(), "download interrupted");
            return Err(TranscodeError::Cancelled);
        }

        let stderr = stderr
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            let exit_code = status.code().unwrap_or(-1);
            error!(exit_code, path = %destination.display(), "transcoder failed");
            if !stderr.is_empty() {
                error!("transcoder error output:\n{stderr}");
            }
            return Err(TranscodeError::Failed { exit_code, stderr });
        }

        part.promote(destination).map_err(|err| {
            TranscodeError::io(
                format!("failed to move output into {}", destination.display()),
                err,
            )
        })?;
        Ok(destination.to_path_buf())
    }
}
