use std::io;
use std::io::Read;
use std::io::Write;
use std::os::fd::RawFd;

use zeroize::Zeroize;

use crate::error::Error;
use crate::error::Result;
use crate::secret::GROWTH;
use crate::secret::Secret;

const PROMPT: &[u8] = b"rd: enter passwd: ";

/// Echo suppression on whatever channel the secret is read from. The system
/// implementation mutates termios state; tests substitute a recorder.
pub trait EchoControl {
    /// Saves the current attributes and disables character echo, flushing
    /// pending input.
    fn suppress(&mut self) -> Result<()>;
    /// Restores the attributes captured by `suppress`. Idempotent.
    fn restore(&mut self) -> Result<()>;
}

/// Termios-backed echo control for a terminal file descriptor.
pub struct TermiosEcho {
    fd: RawFd,
    saved: Option<libc::termios>,
}

impl TermiosEcho {
    pub fn new(fd: RawFd) -> Self {
        Self { fd, saved: None }
    }
}

impl EchoControl for TermiosEcho {
    fn suppress(&mut self) -> Result<()> {
        // SAFETY: tcgetattr only writes into the supplied struct.
        let mut attrs: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(self.fd, &mut attrs) } == -1 {
            return Err(Error::TerminalState {
                action: "get",
                source: io::Error::last_os_error(),
            });
        }
        self.saved = Some(attrs);

        let mut silenced = attrs;
        silenced.c_lflag &= !libc::ECHO;
        // SAFETY: silenced is a valid termios value derived from the one the
        // kernel just handed out.
        if unsafe { libc::tcsetattr(self.fd, libc::TCSAFLUSH, &silenced) } == -1 {
            return Err(Error::TerminalState {
                action: "set",
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    fn restore(&mut self) -> Result<()> {
        let Some(saved) = self.saved.take() else {
            return Ok(());
        };
        // SAFETY: saved is the attribute set captured before suppression.
        if unsafe { libc::tcsetattr(self.fd, libc::TCSAFLUSH, &saved) } == -1 {
            return Err(Error::TerminalState {
                action: "restore",
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}

/// Restores echo on every exit path. The happy path calls `finish` so a
/// restore failure is observable; unwinding through an error hits the Drop
/// backstop instead.
struct EchoRestore<'a> {
    echo: Option<&'a mut dyn EchoControl>,
}

impl<'a> EchoRestore<'a> {
    fn new(echo: &'a mut dyn EchoControl) -> Self {
        Self { echo: Some(echo) }
    }

    fn finish(mut self) -> Result<()> {
        match self.echo.take() {
            Some(echo) => echo.restore(),
            None => Ok(()),
        }
    }
}

impl Drop for EchoRestore<'_> {
    fn drop(&mut self) {
        if let Some(echo) = self.echo.take() {
            let _ = echo.restore();
        }
    }
}

/// Prompts on `output` and reads the secret from `input` with echo
/// suppressed. Echo is restored before this function returns, on success
/// and on every failure. A trailing line terminator is stripped; end of
/// input with no characters yields a zero-length secret.
pub fn read_secret<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    echo: &mut dyn EchoControl,
) -> Result<Secret> {
    echo.suppress()?;
    let guard = EchoRestore::new(echo);

    output
        .write_all(PROMPT)
        .and_then(|()| output.flush())
        .map_err(|source| Error::Read { source })?;

    let mut secret = read_line(input)?;
    secret.strip_newline();

    guard.finish()?;
    // Visual feedback for the enter keypress the terminal swallowed.
    let _ = output.write_all(b"\n");
    Ok(secret)
}

fn read_line<R: Read>(input: &mut R) -> Result<Secret> {
    let mut secret = Secret::new();
    let mut chunk = [0u8; GROWTH];
    loop {
        let n = input
            .read(&mut chunk)
            .map_err(|source| Error::Read { source })?;
        if n == 0 {
            break;
        }
        let result = secret.push_chunk(&chunk[..n]);
        chunk.zeroize();
        result?;
        if secret.as_bytes().last() == Some(&b'\n') {
            break;
        }
    }
    Ok(secret)
}
