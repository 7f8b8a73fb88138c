use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::Read;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::fs::MetadataExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use tracing::debug;

use crate::error::Error;
use crate::error::Result;

/// The numeric fields in the process status record have a known maximum
/// width, so a fixed buffer is enough to reach the controlling-terminal
/// field even with a maximally long command name.
const STAT_BUF_LEN: usize = 512;

const PROC_SELF_STAT: &str = "/proc/self/stat";

/// Locates the process's real control terminal, independent of whatever is
/// attached to the standard streams, and opens it for both the prompt write
/// and the secret read.
///
/// Standard input/output may be redirected to pipes or files; prompting
/// there could echo a password into a log or silently read one from a
/// non-interactive source.
pub fn resolve() -> Result<File> {
    let (buf, len) = read_status()?;
    let device = tty_device_number(&buf[..len])?;
    open_matching_device(device)
}

fn read_status() -> Result<([u8; STAT_BUF_LEN], usize)> {
    let mut file = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOFOLLOW)
        .open(PROC_SELF_STAT)
        .map_err(|source| Error::ProcessStatus { source })?;

    // procfs delivers short reads; keep going until EOF or the buffer is
    // exhausted.
    let mut buf = [0u8; STAT_BUF_LEN];
    let mut len = 0;
    while len < buf.len() {
        let n = file
            .read(&mut buf[len..])
            .map_err(|source| Error::ProcessStatus { source })?;
        if n == 0 {
            break;
        }
        len += n;
    }
    Ok((buf, len))
}

/// Parses the controlling-terminal device number out of a raw status
/// record. The command name sits between the first `(` and the *last* `)`
/// because the name itself may contain spaces and parentheses; four
/// whitespace-delimited fields past it comes the device number.
fn tty_device_number(stat: &[u8]) -> Result<libc::dev_t> {
    let open = stat
        .iter()
        .position(|&b| b == b'(')
        .ok_or(Error::NoControllingTerminal)?;
    let close = stat
        .iter()
        .rposition(|&b| b == b')')
        .ok_or(Error::NoControllingTerminal)?;
    if close <= open {
        return Err(Error::NoControllingTerminal);
    }

    let field = stat[close + 1..]
        .split(|&b| b.is_ascii_whitespace())
        .filter(|field| !field.is_empty())
        .nth(4)
        .ok_or(Error::NoControllingTerminal)?;

    // A parse failure and device number zero both mean "no controlling
    // terminal".
    let device = std::str::from_utf8(field)
        .ok()
        .and_then(|text| text.parse::<libc::dev_t>().ok())
        .unwrap_or(0);
    if device == 0 {
        return Err(Error::NoControllingTerminal);
    }
    Ok(device)
}

/// True only for a character device whose raw device number matches the one
/// parsed from the status record. Guards against stale path construction
/// and pre-created impostor nodes.
fn device_matches(metadata: &fs::Metadata, device: libc::dev_t) -> bool {
    metadata.file_type().is_char_device() && metadata.rdev() == device
}

fn open_matching_device(device: libc::dev_t) -> Result<File> {
    let minor = libc::minor(device);
    for candidate in [format!("/dev/tty{minor}"), format!("/dev/pts/{minor}")] {
        if let Some(terminal) = open_candidate(Path::new(&candidate), device) {
            debug!(candidate = %candidate, "controlling terminal resolved");
            return Ok(terminal);
        }
    }
    Err(Error::NoControllingTerminal)
}

fn open_candidate(path: &Path, device: libc::dev_t) -> Option<File> {
    let metadata = fs::metadata(path).ok()?;
    if !device_matches(&metadata, device) {
        return None;
    }
    // Read-write for the prompt and the secret; never acquired as a new
    // controlling terminal.
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY)
        .open(path)
        .ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::device_matches;
    use super::tty_device_number;
    use crate::error::Error;

    #[test]
    fn parses_the_fifth_field_after_the_command_name() {
        let stat = b"1234 (cat) R 1 1234 1234 34816 1234 4194304";
        assert_eq!(tty_device_number(stat).unwrap(), 34816);
    }

    #[test]
    fn command_names_with_spaces_and_parens_are_skipped_correctly() {
        let stat = b"77 (tmux: client (attached)) S 1 77 77 34817 77 123";
        assert_eq!(tty_device_number(stat).unwrap(), 34817);
    }

    #[test]
    fn device_zero_means_no_controlling_terminal() {
        let stat = b"1 (init) S 0 1 1 0 -1 4194560";
        assert!(matches!(
            tty_device_number(stat),
            Err(Error::NoControllingTerminal)
        ));
    }

    #[test]
    fn unparseable_records_are_rejected() {
        assert!(tty_device_number(b"").is_err());
        assert!(tty_device_number(b"no fields here").is_err());
        assert!(tty_device_number(b"1 (short) R 1 2").is_err());
        assert!(tty_device_number(b"1 (bad) R 1 2 3 not-a-number 5").is_err());
    }

    #[test]
    fn mismatched_device_numbers_are_never_accepted() {
        let metadata = std::fs::metadata("/dev/null").unwrap();
        let device = std::os::unix::fs::MetadataExt::rdev(&metadata);
        assert!(device_matches(&metadata, device));
        assert!(!device_matches(&metadata, device + 1));
    }

    #[test]
    fn regular_files_are_never_accepted_as_terminals() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let metadata = file.as_file().metadata().unwrap();
        let device = std::os::unix::fs::MetadataExt::rdev(&metadata);
        assert!(!device_matches(&metadata, device));
    }
}
