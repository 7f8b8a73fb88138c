use std::ffi::CString;
use std::io;

use crate::account::AccountRecord;
use crate::error::Error;
use crate::error::Result;

/// Which step of the privilege transition failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionStep {
    SupplementaryGroups,
    GroupId,
    UserId,
}

impl std::fmt::Display for TransitionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionStep::SupplementaryGroups => write!(f, "set groups"),
            TransitionStep::GroupId => write!(f, "set group id"),
            TransitionStep::UserId => write!(f, "set user id"),
        }
    }
}

/// Fails unless the invoking process's real or effective user id is the
/// superuser. Precondition for every privileged syscall that follows, so it
/// runs before any other step.
pub fn require_superuser() -> Result<()> {
    // SAFETY: getuid and geteuid cannot fail.
    let (uid, euid) = unsafe { (libc::getuid(), libc::geteuid()) };
    if uid != 0 && euid != 0 {
        return Err(Error::InsufficientPrivilege);
    }
    Ok(())
}

/// The identity-changing syscalls behind a seam so transition ordering is
/// observable in tests.
pub trait IdentityOps {
    fn init_groups(&mut self, name: &str, gid: libc::gid_t) -> io::Result<()>;
    fn set_group_id(&mut self, gid: libc::gid_t) -> io::Result<()>;
    fn set_user_id(&mut self, uid: libc::uid_t) -> io::Result<()>;
}

/// Identity operations backed by `initgroups`/`setgid`/`setuid`.
pub struct SystemIdentity;

impl IdentityOps for SystemIdentity {
    fn init_groups(&mut self, name: &str, gid: libc::gid_t) -> io::Result<()> {
        let cname = CString::new(name).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "account name contains an interior NUL byte",
            )
        })?;
        // SAFETY: cname is NUL-terminated and outlives the call.
        if unsafe { libc::initgroups(cname.as_ptr(), gid) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn set_group_id(&mut self, gid: libc::gid_t) -> io::Result<()> {
        // SAFETY: plain syscall wrapper.
        if unsafe { libc::setgid(gid) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn set_user_id(&mut self, uid: libc::uid_t) -> io::Result<()> {
        // SAFETY: plain syscall wrapper.
        if unsafe { libc::setuid(uid) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// Transitions process identity to the target account in mandatory order:
/// supplementary groups, then group id, then user id. Setting the user id
/// first would strip the privilege needed to change groups and silently
/// leave the wrong membership active, so the user id always goes last.
/// Every step is fatal; none may be skipped once authentication succeeded.
pub fn transition(
    ops: &mut dyn IdentityOps,
    account: &AccountRecord,
    init_supplementary_groups: bool,
) -> Result<()> {
    if init_supplementary_groups {
        ops.init_groups(&account.name, account.gid)
            .map_err(|source| Error::PrivilegeTransition {
                step: TransitionStep::SupplementaryGroups,
                source,
            })?;
    }
    ops.set_group_id(account.gid)
        .map_err(|source| Error::PrivilegeTransition {
            step: TransitionStep::GroupId,
            source,
        })?;
    ops.set_user_id(account.uid)
        .map_err(|source| Error::PrivilegeTransition {
            step: TransitionStep::UserId,
            source,
        })?;
    Ok(())
}
