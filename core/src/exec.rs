use std::ffi::CString;
use std::io;

use crate::error::Error;
use crate::error::ExecFailure;

/// Replaces the current process image with `argv` via `execvp`, so the
/// program is resolved against `PATH` as it stands after sanitization.
/// Returns only on failure; a missing command is distinguished from every
/// other launch failure.
pub fn replace(argv: &[String]) -> Error {
    let Some(program) = argv.first() else {
        return Error::NoProgramGiven;
    };

    let c_argv: Vec<CString> = match argv
        .iter()
        .map(|arg| CString::new(arg.as_str()))
        .collect::<Result<_, _>>()
    {
        Ok(c_argv) => c_argv,
        Err(_) => {
            return Error::Exec {
                program: program.clone(),
                reason: ExecFailure::Other(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "argument contains an interior NUL byte",
                )),
            };
        }
    };

    let mut c_ptrs: Vec<*const libc::c_char> = c_argv.iter().map(|arg| arg.as_ptr()).collect();
    c_ptrs.push(std::ptr::null());

    // SAFETY: c_ptrs is a NULL-terminated array of pointers into c_argv,
    // which outlives the call; execvp only ever returns on failure.
    unsafe {
        libc::execvp(c_ptrs[0], c_ptrs.as_ptr());
    }

    let source = io::Error::last_os_error();
    let reason = if source.raw_os_error() == Some(libc::ENOENT) {
        ExecFailure::NotFound
    } else {
        ExecFailure::Other(source)
    };
    Error::Exec {
        program: program.clone(),
        reason,
    }
}
