//! Synchronous execution of external commands.
//!
//! A command is a list of [`OsString`]s, the first element naming the program.
//! Three shapes are supported:
//!
//! - a single command,
//! - a *pipeline*, a list of commands where each stage's stdout feeds the next
//!   stage's stdin,
//! - a *spring*, a list of head commands executed serially whose concatenated
//!   output feeds a trailing pipeline.
//!
//! Standard streams are connected to `/dev/null`, to an already open
//! descriptor, or to byte buffers fed and drained by a poll loop in the
//! parent. Unlike a shell, a pipeline reports the *first* non-zero exit among
//! its stages, so mid-pipeline failures are never masked by a succeeding last
//! stage.

use crate::error::Error;
use itertools::Itertools as _;
use std::ffi::OsStr;
use std::ffi::OsString;
use std::io;
use std::os::fd::AsRawFd as _;
use std::os::fd::BorrowedFd;
use std::os::fd::FromRawFd as _;
use std::os::fd::OwnedFd;
use std::os::unix::process::ExitStatusExt as _;
use std::process::Child;
use std::process::Command;
use std::process::ExitStatus;
use std::process::Stdio;

pub type Cmd = Vec<OsString>;

/// Convenience constructor for a [`Cmd`].
pub fn cmd<I, S>(args: I) -> Cmd
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    args.into_iter().map(Into::into).collect()
}

/// Where a child's stdin comes from.
pub enum Feed<'a> {
    /// Redirect from `/dev/null`.
    Null,
    /// Borrow an already open descriptor.
    Fd(BorrowedFd<'a>),
    /// Feed the given bytes through a pipe.
    Bytes(&'a [u8]),
}

/// Where a child's stdout or stderr goes.
pub enum Sink<'a> {
    /// Redirect to `/dev/null`.
    Null,
    /// Borrow an already open descriptor.
    Fd(BorrowedFd<'a>),
    /// Collect the output into a byte buffer.
    Capture,
}

/// Run a single command. Returns the captured `(stdout, stderr)` bytes; a
/// stream that was not set to [`Sink::Capture`] yields an empty buffer.
pub fn execute(
    command: &Cmd,
    env: &[(&str, &str)],
    stdin: Feed<'_>,
    stdout: Sink<'_>,
    stderr: Sink<'_>,
) -> Result<(Vec<u8>, Vec<u8>), Error> {
    pipeline(std::slice::from_ref(command), env, stdin, stdout, stderr)
}

/// Run a pipeline of commands connected stdout-to-stdin.
///
/// Stderr of every stage is redirected to the single `stderr` target. All
/// children are reaped even after a failure; the error reports the first
/// non-zero exit in pipeline order.
pub fn pipeline(
    commands: &[Cmd],
    env: &[(&str, &str)],
    stdin: Feed<'_>,
    stdout: Sink<'_>,
    stderr: Sink<'_>,
) -> Result<(Vec<u8>, Vec<u8>), Error> {
    assert!(!commands.is_empty(), "empty pipeline");
    let mut streams = Streams::new(stdin, stdout, stderr)?;
    let children = spawn_pipeline(commands, env, &mut streams, None)?;
    streams.close_child_ends();
    streams.set_blocking(true);
    streams.drain()?;
    let (out, err) = streams.into_data();
    wait_all(children, 0, None, &err)?;
    Ok((out, err))
}

/// Run a spring: execute `heads` serially, with all of their stdout
/// concatenated into the stdin of the `tail` pipeline (or into `stdout`
/// directly when `tail` is empty).
///
/// The tail is started together with the first head so that a head never
/// blocks on a full pipe buffer with nobody draining it. While heads are
/// running the stream polling is non-blocking, alternating between spawning,
/// reaping and draining; once every head has been launched polling blocks
/// until completion. A spring never reads from stdin.
pub fn spring(
    heads: &[Cmd],
    tail: &[Cmd],
    env: &[(&str, &str)],
    stdout: Sink<'_>,
    stderr: Sink<'_>,
) -> Result<(Vec<u8>, Vec<u8>), Error> {
    assert!(!heads.is_empty(), "spring without head commands");
    let mut streams = Streams::new(Feed::Null, stdout, stderr)?;
    streams.set_blocking(false);

    // Pipe connecting the head commands to the tail pipeline. Each head gets
    // its own duplicate of the write end; the parent's copy must be closed
    // before the blocking drain or the tail would never see end-of-file.
    let (mut tail_stdin, mut feed_write) = match tail.is_empty() {
        true => (None, None),
        false => {
            let (read_end, write_end) = new_pipe()?;
            (Some(read_end), Some(write_end))
        }
    };

    let mut reaped_status = 0;
    let mut reaped_failed = None;
    let mut waiting: Vec<Spawned> = Vec::new();
    let mut tail_children: Vec<Spawned> = Vec::new();
    for (i, head) in heads.iter().enumerate() {
        let last = i == heads.len() - 1;
        let head_stdout = match &feed_write {
            Some(fd) => Stdio::from(fd.try_clone().map_err(Error::Io)?),
            None => streams.child_stdout_stdio()?,
        };
        let mut spawned = spawn_child(
            head,
            env,
            Stdio::null(),
            head_stdout,
            streams.child_stderr_stdio()?,
        )?;
        if i == 0 && !tail.is_empty() {
            tail_children = spawn_pipeline(tail, env, &mut streams, tail_stdin.take())?;
        }
        if last {
            streams.poll_once()?;
            // The last head needs no serialization against a successor; it is
            // reaped together with the tail, but before it in pipeline order.
            waiting.push(spawned);
        } else {
            let status = wait_while_polling(&mut spawned, &mut streams)?;
            if status != 0 {
                // Do not start any further heads; still drain and reap the
                // tail below so no zombies are left behind.
                reaped_status = status;
                reaped_failed = Some(spawned.command);
                break;
            }
        }
    }
    waiting.append(&mut tail_children);

    drop(feed_write.take());
    streams.close_child_ends();
    streams.set_blocking(true);
    streams.drain()?;
    let (out, err) = streams.into_data();
    wait_all(waiting, reaped_status, reaped_failed, &err)?;
    Ok((out, err))
}

/// Format a single argument for display, single-quoting where a shell would
/// need it.
///
/// Note: This is not a complete implementation.
///
/// # Examples
/// ```
/// # use git_subrepo::execute::format_arg_lossy;
/// use std::ffi::OsStr;
///
/// assert_eq!(format_arg_lossy(OsStr::new("arg")), "arg");
/// assert_eq!(format_arg_lossy(OsStr::new("a'rg")), "a\\'rg");
/// assert_eq!(format_arg_lossy(OsStr::new("some arg")), "'some arg'");
/// assert_eq!(format_arg_lossy(OsStr::new("a$rg")), "'a$rg'");
/// ```
pub fn format_arg_lossy(arg: &OsStr) -> String {
    let s = arg.to_string_lossy();
    if [' ', '"', '$', '\n'].iter().any(|c| s.contains(*c)) {
        format!("'{}'", s.replace('\'', "'\\''"))
    } else if s.contains('\'') {
        s.replace('\'', "\\'")
    } else {
        s.to_string()
    }
}

/// Format a command as a human-readable string.
pub fn format_command(command: &[OsString]) -> String {
    command.iter().map(|arg| format_arg_lossy(arg)).join(" ")
}

/// Format a pipeline as ` | `-joined commands.
pub fn format_pipeline(commands: &[Cmd]) -> String {
    commands.iter().map(|c| format_command(c)).join(" | ")
}

/// Format a spring as `(head + head) | tail | tail`.
pub fn format_spring(heads: &[Cmd], tail: &[Cmd]) -> String {
    let heads = format!("({})", heads.iter().map(|c| format_command(c)).join(" + "));
    if tail.is_empty() {
        heads
    } else {
        format!("{heads} | {}", format_pipeline(tail))
    }
}

struct Spawned {
    child: Child,
    command: String,
}

fn spawn_child(
    command: &Cmd,
    env: &[(&str, &str)],
    stdin: Stdio,
    stdout: Stdio,
    stderr: Stdio,
) -> Result<Spawned, Error> {
    let formatted = format_command(command);
    let mut process = Command::new(&command[0]);
    process
        .args(&command[1..])
        .stdin(stdin)
        .stdout(stdout)
        .stderr(stderr);
    for (key, value) in env {
        process.env(key, value);
    }
    let child = process.spawn().map_err(|source| Error::Spawn {
        command: formatted.clone(),
        source,
    })?;
    Ok(Spawned {
        child,
        command: formatted,
    })
}

/// Spawn all stages of a pipeline. The first stage reads from
/// `stdin_override` when given, otherwise from the stream setup.
fn spawn_pipeline(
    commands: &[Cmd],
    env: &[(&str, &str)],
    streams: &mut Streams,
    mut stdin_override: Option<OwnedFd>,
) -> Result<Vec<Spawned>, Error> {
    let mut children = Vec::with_capacity(commands.len());
    let mut prev_read: Option<OwnedFd> = None;
    for (i, command) in commands.iter().enumerate() {
        let last = i == commands.len() - 1;
        let stdin = match prev_read.take().or_else(|| stdin_override.take()) {
            Some(fd) => Stdio::from(fd),
            None => streams.child_stdin_stdio()?,
        };
        let stdout = if last {
            streams.child_stdout_stdio()?
        } else {
            let (read_end, write_end) = new_pipe()?;
            prev_read = Some(read_end);
            Stdio::from(write_end)
        };
        // Stderr is not part of the pipe chain; every stage reports to the
        // same target.
        let stderr = streams.child_stderr_stdio()?;
        children.push(spawn_child(command, env, stdin, stdout, stderr)?);
    }
    Ok(children)
}

/// Reap every child and report the first non-zero exit in list order. A
/// `status`/`failed` pair from an earlier serial reap takes precedence.
fn wait_all(
    children: Vec<Spawned>,
    mut status: i32,
    mut failed: Option<String>,
    stderr: &[u8],
) -> Result<(), Error> {
    for mut spawned in children {
        let this_status = wait_status(&mut spawned.child)?;
        if this_status != 0 && status == 0 {
            status = this_status;
            failed = Some(spawned.command);
        }
    }
    if status != 0 {
        return Err(Error::Process {
            status,
            command: failed.expect("a failing command is recorded with its status"),
            stderr: stderr.to_vec(),
        });
    }
    Ok(())
}

fn wait_status(child: &mut Child) -> Result<i32, Error> {
    // Child::wait restarts on EINTR and does not report stopped or continued
    // children, so SIGSTOP/SIGCONT are transparent here.
    let status = child.wait()?;
    Ok(exit_status_code(status))
}

/// Decode an exit status; signal deaths become negated signal numbers.
fn exit_status_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| -status.signal().unwrap_or(1))
}

/// Alternate between reaping one child and non-blocking polling, so the
/// serial part of a spring cannot deadlock against an undrained tail.
fn wait_while_polling(spawned: &mut Spawned, streams: &mut Streams) -> Result<i32, Error> {
    loop {
        if let Some(status) = spawned.child.try_wait().map_err(Error::Io)? {
            return Ok(exit_status_code(status));
        }
        if streams.poll_once()? == 0 {
            // No pipe events and the child is still running.
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }
}

fn new_pipe() -> Result<(OwnedFd, OwnedFd), Error> {
    let mut fds = [0; 2];
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error().into());
    }
    // SAFETY: pipe2 returned two fresh descriptors owned by nobody else.
    unsafe { Ok((OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1]))) }
}

/// Decode a poll event mask into a human readable string.
fn format_poll_events(events: i16) -> String {
    let names = [
        (libc::POLLERR, "ERR"),
        (libc::POLLHUP, "HUP"),
        (libc::POLLIN, "IN"),
        (libc::POLLNVAL, "NVAL"),
        (libc::POLLOUT, "OUT"),
        (libc::POLLPRI, "PRI"),
    ];
    let joined = names
        .iter()
        .filter(|(mask, _)| events & mask != 0)
        .map(|(_, name)| *name)
        .join("|");
    format!("{joined} ({events})")
}

const READ_CHUNK: usize = 4 * 1024;

/// The side of a pipe handed to children, kept open in the parent only until
/// every child has been spawned.
enum ChildEnd {
    Null,
    Owned(OwnedFd),
    Closed,
}

impl ChildEnd {
    fn stdio(&self) -> Result<Stdio, Error> {
        match self {
            ChildEnd::Null => Ok(Stdio::null()),
            ChildEnd::Owned(fd) => Ok(Stdio::from(fd.try_clone().map_err(Error::Io)?)),
            ChildEnd::Closed => {
                unreachable!("child stream requested after the child ends were closed")
            }
        }
    }

    fn close(&mut self) {
        *self = ChildEnd::Closed;
    }
}

struct WriteChannel {
    fd: Option<OwnedFd>,
    data: Vec<u8>,
    written: usize,
}

struct ReadChannel {
    fd: Option<OwnedFd>,
    data: Vec<u8>,
}

/// The parent-side plumbing of a pipeline or spring: optional byte channels
/// polled by the parent plus the descriptors to hand to children.
struct Streams {
    stdin: Option<WriteChannel>,
    stdout: Option<ReadChannel>,
    stderr: Option<ReadChannel>,
    child_stdin: ChildEnd,
    child_stdout: ChildEnd,
    child_stderr: ChildEnd,
    blocking: bool,
}

impl Streams {
    fn new(stdin: Feed<'_>, stdout: Sink<'_>, stderr: Sink<'_>) -> Result<Self, Error> {
        let (stdin_channel, child_stdin) = match stdin {
            Feed::Null => (None, ChildEnd::Null),
            Feed::Fd(fd) => (
                None,
                ChildEnd::Owned(fd.try_clone_to_owned().map_err(Error::Io)?),
            ),
            Feed::Bytes(data) => {
                let (read_end, write_end) = new_pipe()?;
                (
                    Some(WriteChannel {
                        fd: Some(write_end),
                        data: data.to_vec(),
                        written: 0,
                    }),
                    ChildEnd::Owned(read_end),
                )
            }
        };
        let read_sink = |sink: Sink<'_>| -> Result<(Option<ReadChannel>, ChildEnd), Error> {
            match sink {
                Sink::Null => Ok((None, ChildEnd::Null)),
                Sink::Fd(fd) => Ok((
                    None,
                    ChildEnd::Owned(fd.try_clone_to_owned().map_err(Error::Io)?),
                )),
                Sink::Capture => {
                    let (read_end, write_end) = new_pipe()?;
                    Ok((
                        Some(ReadChannel {
                            fd: Some(read_end),
                            data: Vec::new(),
                        }),
                        ChildEnd::Owned(write_end),
                    ))
                }
            }
        };
        let (stdout_channel, child_stdout) = read_sink(stdout)?;
        let (stderr_channel, child_stderr) = read_sink(stderr)?;
        Ok(Streams {
            stdin: stdin_channel,
            stdout: stdout_channel,
            stderr: stderr_channel,
            child_stdin,
            child_stdout,
            child_stderr,
            blocking: false,
        })
    }

    fn child_stdin_stdio(&self) -> Result<Stdio, Error> {
        self.child_stdin.stdio()
    }

    fn child_stdout_stdio(&self) -> Result<Stdio, Error> {
        self.child_stdout.stdio()
    }

    fn child_stderr_stdio(&self) -> Result<Stdio, Error> {
        self.child_stderr.stdio()
    }

    /// Close the parent's copies of the child-side descriptors. Without this
    /// the read channels would never observe end-of-file.
    fn close_child_ends(&mut self) {
        self.child_stdin.close();
        self.child_stdout.close();
        self.child_stderr.close();
    }

    fn set_blocking(&mut self, blocking: bool) {
        self.blocking = blocking;
    }

    fn is_done(&self) -> bool {
        self.stdin.as_ref().is_none_or(|c| c.fd.is_none())
            && self.stdout.as_ref().is_none_or(|c| c.fd.is_none())
            && self.stderr.as_ref().is_none_or(|c| c.fd.is_none())
    }

    /// One pass over the live channels. Returns the number of descriptor
    /// events handled; in non-blocking mode this may be zero.
    fn poll_once(&mut self) -> Result<usize, Error> {
        // Tags identify the channel a pollfd entry belongs to.
        const STDIN: usize = 0;
        const STDOUT: usize = 1;
        const STDERR: usize = 2;

        let mut fds: Vec<libc::pollfd> = Vec::with_capacity(3);
        let mut tags: Vec<usize> = Vec::with_capacity(3);
        if let Some(channel) = &self.stdin
            && let Some(fd) = &channel.fd
        {
            fds.push(libc::pollfd {
                fd: fd.as_raw_fd(),
                events: libc::POLLOUT,
                revents: 0,
            });
            tags.push(STDIN);
        }
        for (channel, tag) in [(&self.stdout, STDOUT), (&self.stderr, STDERR)] {
            if let Some(channel) = channel
                && let Some(fd) = &channel.fd
            {
                fds.push(libc::pollfd {
                    fd: fd.as_raw_fd(),
                    events: libc::POLLIN | libc::POLLPRI,
                    revents: 0,
                });
                tags.push(tag);
            }
        }
        if fds.is_empty() {
            return Ok(0);
        }

        let timeout = if self.blocking { -1 } else { 0 };
        let count = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout) };
        if count < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return Ok(0);
            }
            return Err(err.into());
        }

        let mut handled = 0;
        for (pollfd, tag) in fds.iter().zip(tags) {
            if pollfd.revents == 0 {
                continue;
            }
            handled += 1;
            match tag {
                STDIN => {
                    let channel = self.stdin.as_mut().expect("polled channel exists");
                    handle_write(channel, pollfd.revents)?;
                }
                _ => {
                    let channel = match tag {
                        STDOUT => self.stdout.as_mut(),
                        _ => self.stderr.as_mut(),
                    };
                    handle_read(channel.expect("polled channel exists"), pollfd.revents)?;
                }
            }
        }
        Ok(handled)
    }

    /// Poll until every channel has been flushed or drained.
    fn drain(&mut self) -> Result<(), Error> {
        while !self.is_done() {
            self.poll_once()?;
        }
        Ok(())
    }

    fn into_data(self) -> (Vec<u8>, Vec<u8>) {
        (
            self.stdout.map(|c| c.data).unwrap_or_default(),
            self.stderr.map(|c| c.data).unwrap_or_default(),
        )
    }
}

fn handle_write(channel: &mut WriteChannel, revents: i16) -> Result<(), Error> {
    if revents & libc::POLLOUT != 0
        && let Some(raw) = channel.fd.as_ref().map(|fd| fd.as_raw_fd())
    {
        // Only PIPE_BUF bytes are guaranteed to be writable without blocking.
        let remaining = &channel.data[channel.written..];
        let len = remaining.len().min(libc::PIPE_BUF);
        let written = unsafe { libc::write(raw, remaining.as_ptr().cast(), len) };
        if written < 0 {
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) | Some(libc::EAGAIN) => {}
                // The reader is gone; there is no point in sending more data.
                Some(libc::EPIPE) => channel.fd = None,
                _ => return Err(err.into()),
            }
        } else {
            channel.written += written as usize;
            if channel.written == channel.data.len() {
                channel.fd = None;
            }
        }
    }
    if revents & libc::POLLHUP != 0 {
        channel.fd = None;
    }
    if revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
        return Err(Error::Poll {
            events: format_poll_events(revents),
        });
    }
    Ok(())
}

fn handle_read(channel: &mut ReadChannel, revents: i16) -> Result<(), Error> {
    let hup = revents & libc::POLLHUP != 0;
    if revents & (libc::POLLIN | libc::POLLPRI) != 0 {
        if hup {
            // Data arrived together with the hangup; flush the entire pipe
            // buffer before closing so nothing sent to us is lost.
            while read_some(channel)? {}
            channel.fd = None;
        } else if !read_some(channel)? {
            channel.fd = None;
        }
    } else if hup {
        channel.fd = None;
    }
    if revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
        return Err(Error::Poll {
            events: format_poll_events(revents),
        });
    }
    Ok(())
}

/// Read one chunk into the channel buffer. Returns false on end-of-file.
fn read_some(channel: &mut ReadChannel) -> Result<bool, Error> {
    let Some(fd) = &channel.fd else {
        return Ok(false);
    };
    let mut buf = [0u8; READ_CHUNK];
    let count = unsafe { libc::read(fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
    if count < 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            return Ok(true);
        }
        return Err(err.into());
    }
    if count == 0 {
        return Ok(false);
    }
    channel.data.extend_from_slice(&buf[..count as usize]);
    Ok(true)
}
