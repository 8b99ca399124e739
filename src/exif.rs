//! IPTC/XMP tag writing through a long-lived ExifTool process.
//!
//! ExifTool is started once in `-stay_open` mode and fed argument lists over
//! stdin. Each task ends with `-execute`; the process answers with its
//! normal output followed by a `{ready}` line. Tasks are serialised through
//! a mutex because the protocol has no request ids.
//!
//! A task that does not finish within the task timeout kills the process.
//! The next task starts a fresh one.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::contract::MetadataWriter;
use crate::metadata::GenerationResult;

pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(5);

/// Tags written into an image. Names follow the IPTC fields they land in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTags {
    pub object_name: String,
    pub caption_abstract: String,
    pub keywords: Vec<String>,
    pub rating: u8,
}

impl MetadataTags {
    pub fn from_result(result: &GenerationResult) -> Self {
        Self {
            object_name: result.title.trim().to_string(),
            caption_abstract: result.description.trim().to_string(),
            keywords: result.keywords.terms(),
            rating: result.rating,
        }
    }

    /// One ExifTool argument per line, ending with the target path.
    pub fn to_args(&self, path: &Path) -> Vec<String> {
        let mut args = vec![
            "-overwrite_original".to_string(),
            "-IPTC:CodedCharacterSet=UTF8".to_string(),
            format!("-IPTC:ObjectName={}", single_line(&self.object_name)),
            format!("-IPTC:Caption-Abstract={}", single_line(&self.caption_abstract)),
        ];
        args.extend(
            self.keywords
                .iter()
                .map(|k| format!("-IPTC:Keywords={}", single_line(k))),
        );
        args.push(format!("-XMP:Rating={}", self.rating));
        args.push(target_arg(path));
        args
    }
}

// The argument stream is line-based.
fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

// A leading `-` would be read as an option.
fn target_arg(path: &Path) -> String {
    let target = single_line(&path.to_string_lossy());
    if target.starts_with('-') {
        format!("./{target}")
    } else {
        target
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExifError {
    #[error("failed to start exiftool '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("exiftool I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("exiftool did not answer within {0:?}")]
    Timeout(Duration),
    #[error("exiftool did not update the file: {0}")]
    WriteFailed(String),
    #[error("exiftool closed its output unexpectedly")]
    Closed,
    #[error("file path is missing")]
    MissingPath,
}

struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Session {
    async fn exchange(&mut self, args: &[String]) -> Result<String, ExifError> {
        let mut request = String::new();
        for arg in args {
            request.push_str(arg);
            request.push('\n');
        }
        request.push_str("-execute\n");
        self.stdin.write_all(request.as_bytes()).await?;
        self.stdin.flush().await?;

        let mut output = String::new();
        let mut line = String::new();
        loop {
            line.clear();
            if self.stdout.read_line(&mut line).await? == 0 {
                return Err(ExifError::Closed);
            }
            if line.trim_end().starts_with("{ready") {
                return Ok(output);
            }
            output.push_str(&line);
        }
    }
}

/// Handle to the shared ExifTool process.
pub struct ExifTool {
    program: PathBuf,
    prefix_args: Vec<String>,
    task_timeout: Duration,
    session: Mutex<Option<Session>>,
}

impl ExifTool {
    /// Starts `binary -stay_open True -@ -`.
    pub async fn spawn(binary: impl Into<PathBuf>, task_timeout: Duration) -> Result<Self, ExifError> {
        Self::spawn_with(binary, Vec::new(), task_timeout).await
    }

    /// Like [`ExifTool::spawn`] with extra arguments placed before the
    /// stay-open flags, e.g. an interpreter script.
    pub async fn spawn_with(
        program: impl Into<PathBuf>,
        prefix_args: Vec<String>,
        task_timeout: Duration,
    ) -> Result<Self, ExifError> {
        let tool = Self {
            program: program.into(),
            prefix_args,
            task_timeout,
            session: Mutex::new(None),
        };
        let session = tool.start()?;
        *tool.session.lock().await = Some(session);
        Ok(tool)
    }

    fn start(&self) -> Result<Session, ExifError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix_args)
            .args(["-stay_open", "True", "-@", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd.spawn().map_err(|source| ExifError::Spawn {
            program: self.program.display().to_string(),
            source,
        })?;

        let stdin = child.stdin.take().ok_or(ExifError::Closed)?;
        let stdout = child.stdout.take().ok_or(ExifError::Closed)?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.trim().is_empty() {
                        warn!(stderr = %line, "[EXIF] exiftool reported");
                    }
                }
            });
        }
        info!(program = %self.program.display(), pid = ?child.id(), "[EXIF] Started exiftool");
        Ok(Session {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Runs one task and returns everything printed before `{ready}`.
    pub async fn run_task(&self, args: &[String]) -> Result<String, ExifError> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            *guard = Some(self.start()?);
        }
        let Some(session) = guard.as_mut() else {
            return Err(ExifError::Closed);
        };

        match tokio::time::timeout(self.task_timeout, session.exchange(args)).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => {
                error!(error = %e, "[EXIF][ERROR] Task failed, restarting exiftool on next use");
                *guard = None;
                Err(e)
            }
            Err(_) => {
                error!(timeout = ?self.task_timeout, "[EXIF][ERROR] Task timed out, killing exiftool");
                *guard = None;
                Err(ExifError::Timeout(self.task_timeout))
            }
        }
    }

    /// Asks the process to exit, killing it if it does not within the task timeout.
    pub async fn shutdown(&self) -> Result<(), ExifError> {
        let Some(mut session) = self.session.lock().await.take() else {
            return Ok(());
        };
        let _ = session.stdin.write_all(b"-stay_open\nFalse\n").await;
        let _ = session.stdin.flush().await;
        match tokio::time::timeout(self.task_timeout, session.child.wait()).await {
            Ok(Ok(status)) => {
                info!(%status, "[EXIF] exiftool exited");
                Ok(())
            }
            Ok(Err(e)) => Err(ExifError::Io(e)),
            Err(_) => {
                warn!("[EXIF] exiftool ignored shutdown, killing");
                session.child.kill().await?;
                Ok(())
            }
        }
    }
}

/// Number from ExifTool's "N image files updated" summary.
pub fn updated_count(output: &str) -> usize {
    static UPDATED: OnceLock<Regex> = OnceLock::new();
    let re = UPDATED.get_or_init(|| {
        Regex::new(r"(\d+) image files? updated").expect("static regex is valid")
    });
    re.captures(output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl MetadataWriter for ExifTool {
    async fn write_tags(&self, path: &Path, tags: &MetadataTags) -> Result<(), ExifError> {
        if path.as_os_str().is_empty() {
            return Err(ExifError::MissingPath);
        }
        debug!(path = %path.display(), keywords = tags.keywords.len(), "[EXIF] Writing tags");
        let output = self.run_task(&tags.to_args(path)).await?;
        if updated_count(&output) < 1 {
            return Err(ExifError::WriteFailed(output.trim().to_string()));
        }
        info!(path = %path.display(), "[EXIF] Tags written");
        Ok(())
    }
}
