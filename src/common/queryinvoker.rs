//! queryinvoker.rs -- run the external query tool.
//!
//! The tool is called as
//!
//! ```text
//! query [fixed flags] <UTC timestamp> <"v4"|"v6"> <source port | IPv6 source address>
//! ```
//!
//! Arguments go to the process as a vector. There is no shell and
//! no joined command line anywhere in here.
//!
//! The tool runs in its own process group with a hard timeout.
//! On timeout the whole group is killed and the child is reaped.
//! When the tool exits on its own, whatever it left running in its
//! group is killed too, and the timeout still bounds reading its output.
//!
//! ```text
//! License: LGPL.
//! ```
//
use crate::error::EdictError;
use crate::sanitize::argument_safe;
use crate::validator::{FieldName, ProtocolVersion, SanitizedFields};
use anyhow::anyhow;
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Most stderr kept for the log
const STDERR_SNIPPET_MAX: usize = 2048;

/// Something which can answer a query. The real one runs a subprocess.
pub trait QueryRunner: Send + Sync {
    /// Run a query. Returns the tool's standard output.
    fn query(&self, fields: &SanitizedFields) -> Result<Vec<u8>, EdictError>;
}

/// Program and argument vector for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl QueryCommand {
    /// Build the argument vector. Fixed flags first, then the field values
    /// in the order the tool expects. Each field value is checked for
    /// argument use here, where it is used.
    pub fn build(
        program: &Path,
        flags: &[String],
        fields: &SanitizedFields,
    ) -> Result<Self, EdictError> {
        let mut args = flags.to_vec();
        args.push(argument_safe(FieldName::Timestamp, &fields.timestamp_arg())?);
        args.push(fields.protocol_version().as_arg().to_string());
        let selector = match fields.protocol_version() {
            ProtocolVersion::V4 => {
                let port = fields
                    .source_port()
                    .ok_or(EdictError::Validation {
                        field: FieldName::SourcePort,
                    })?;
                argument_safe(FieldName::SourcePort, &port.to_string())?
            }
            ProtocolVersion::V6 => {
                let address = fields
                    .source_address()
                    .ok_or(EdictError::Validation {
                        field: FieldName::SourceAddress,
                    })?;
                argument_safe(FieldName::SourceAddress, &address.to_string())?
            }
        };
        args.push(selector);
        Ok(Self {
            program: program.to_path_buf(),
            args,
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Runs the external query tool.
pub struct QueryInvoker {
    /// Path to the query tool
    binary: PathBuf,
    /// Fixed leading arguments
    flags: Vec<String>,
    /// Kill the tool after this long
    timeout: Duration,
}

impl QueryInvoker {
    /// Usual new
    pub fn new(binary: PathBuf, flags: Vec<String>, timeout: Duration) -> Self {
        Self {
            binary,
            flags,
            timeout,
        }
    }

    /// Run one command, wait with timeout, collect output.
    pub fn run(&self, command: &QueryCommand) -> Result<Vec<u8>, EdictError> {
        log::info!("Query: {:?} {:?}", command.program, command.args);
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
            .map_err(|e| {
                log::error!("Unable to start query tool {:?}: {}", command.program, e);
                EdictError::UpstreamFailure {
                    exit_code: None,
                    stderr_snippet: format!("spawn failed: {}", e),
                }
            })?;
        //  One deadline covers both the exit and the drain of both pipes.
        let deadline = Instant::now() + self.timeout;
        //  Drain both pipes while waiting, so a chatty tool can't fill a pipe and stall.
        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());
        let status = match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                log::warn!(
                    "Query tool pid {} exceeded {:?}, killing it",
                    child.id(),
                    self.timeout
                );
                kill_and_reap(&mut child);
                return Err(EdictError::UpstreamTimeout(self.timeout));
            }
            Err(e) => {
                kill_and_reap(&mut child);
                return Err(EdictError::Internal(anyhow!("Waiting for query tool: {}", e)));
            }
        };
        //  The tool is done. Anything it left running in its group goes too,
        //  or it could hold the pipes open past the deadline.
        kill_group(child.id(), false);
        let stdout = collect(&stdout_reader, deadline, self.timeout)?;
        let stderr = collect(&stderr_reader, deadline, self.timeout)?;
        if !status.success() || stdout.is_empty() {
            let stderr_snippet = snippet(&stderr);
            log::warn!(
                "Query tool failed. Status: {}, {} bytes of output. Stderr: {}",
                status,
                stdout.len(),
                stderr_snippet
            );
            return Err(EdictError::UpstreamFailure {
                exit_code: status.code(),
                stderr_snippet,
            });
        }
        if !stderr.is_empty() {
            log::debug!("Query tool stderr: {}", snippet(&stderr));
        }
        Ok(stdout)
    }
}

impl QueryRunner for QueryInvoker {
    fn query(&self, fields: &SanitizedFields) -> Result<Vec<u8>, EdictError> {
        let command = QueryCommand::build(&self.binary, &self.flags, fields)?;
        self.run(&command)
    }
}

/// Read a pipe to EOF on its own thread. The result arrives on the channel.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf) {
                log::warn!("Reading query tool output: {}", e);
            }
        }
        //  Nobody listening means the query already gave up.
        let _ = tx.send(buf);
    });
    rx
}

/// Wait for a drained pipe until the deadline.
fn collect(
    reader: &mpsc::Receiver<Vec<u8>>,
    deadline: Instant,
    timeout: Duration,
) -> Result<Vec<u8>, EdictError> {
    match reader.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(buf) => Ok(buf),
        Err(mpsc::RecvTimeoutError::Timeout) => {
            log::warn!("Query tool output still open after {:?}", timeout);
            Err(EdictError::UpstreamTimeout(timeout))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Ok(Vec::new()),
    }
}

/// SIGKILL the process group led by `pid`. An empty group is fine
/// unless `expect_members` says otherwise.
fn kill_group(pid: u32, expect_members: bool) {
    //  The child leads its own group, so its pid is the group id.
    let Ok(pgid) = i32::try_from(pid) else {
        return;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) => log::debug!("Killed query tool process group {}", pgid),
        Err(Errno::ESRCH) if !expect_members => {}
        Err(e) => log::warn!("killpg({}) failed: {}", pgid, e),
    }
}

/// Kill the child's whole process group, then reap the child.
fn kill_and_reap(child: &mut std::process::Child) {
    kill_group(child.id(), true);
    let _ = child.kill();
    if let Err(e) = child.wait() {
        log::error!("Unable to reap query tool pid {}: {}", child.id(), e);
    }
}

/// Lossy UTF-8, capped.
fn snippet(b: &[u8]) -> String {
    String::from_utf8_lossy(&b[..b.len().min(STDERR_SNIPPET_MAX)])
        .trim()
        .to_string()
}
