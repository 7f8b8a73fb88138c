use std::ffi::CStr;
use std::ffi::CString;

use tracing::debug;

use crate::error::Error;
use crate::error::Result;

/// Placeholder the passwd database stores when the real credential lives in
/// the shadow database.
const SHADOW_PLACEHOLDER: &str = "x";

/// Identity and profile data for one account, resolved exactly once per
/// invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountRecord {
    pub name: String,
    pub uid: libc::uid_t,
    pub gid: libc::gid_t,
    pub home: String,
    pub shell: String,
    /// Stored credential field. May be the shadow placeholder until
    /// [`resolve_credential`] replaces it.
    pub credential: String,
}

/// Lookup service over the system account and shadow databases. The trait
/// seam keeps the pipeline testable without a real passwd file.
pub trait AccountDirectory {
    fn account(&self, name: &str) -> Option<AccountRecord>;
    fn shadow_credential(&self, name: &str) -> Option<String>;
}

/// Directory backed by `getpwnam(3)` and `getspnam(3)`.
pub struct SystemDirectory;

impl AccountDirectory for SystemDirectory {
    fn account(&self, name: &str) -> Option<AccountRecord> {
        let cname = CString::new(name).ok()?;
        // SAFETY: getpwnam returns NULL or a pointer to static storage that
        // stays valid until the next passwd lookup; all fields are copied
        // out before this function returns.
        unsafe {
            let pw = libc::getpwnam(cname.as_ptr());
            if pw.is_null() {
                return None;
            }
            Some(AccountRecord {
                name: string_field((*pw).pw_name),
                uid: (*pw).pw_uid,
                gid: (*pw).pw_gid,
                home: string_field((*pw).pw_dir),
                shell: string_field((*pw).pw_shell),
                credential: string_field((*pw).pw_passwd),
            })
        }
    }

    fn shadow_credential(&self, name: &str) -> Option<String> {
        let cname = CString::new(name).ok()?;
        // SAFETY: getspnam returns NULL or a pointer to static storage; the
        // credential field is copied out immediately.
        unsafe {
            let sp = libc::getspnam(cname.as_ptr());
            if sp.is_null() || (*sp).sp_pwdp.is_null() {
                return None;
            }
            Some(string_field((*sp).sp_pwdp))
        }
    }
}

/// Copies a possibly-NULL C string field into owned memory.
///
/// SAFETY: callers must pass NULL or a pointer to a NUL-terminated string.
unsafe fn string_field(ptr: *const libc::c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// Fetches the account record, failing when the name is unknown.
pub fn lookup(directory: &dyn AccountDirectory, name: &str) -> Result<AccountRecord> {
    let record = directory.account(name).ok_or_else(|| Error::UnknownAccount {
        name: name.to_string(),
    })?;
    debug!(name, uid = record.uid, gid = record.gid, "resolved account");
    Ok(record)
}

/// Replaces a shadow placeholder with the value from the shadow store. Only
/// called when authentication is actually going to happen.
pub fn resolve_credential(
    directory: &dyn AccountDirectory,
    record: &mut AccountRecord,
) -> Result<()> {
    if record.credential == SHADOW_PLACEHOLDER {
        record.credential =
            directory
                .shadow_credential(&record.name)
                .ok_or_else(|| Error::ShadowLookupFailed {
                    name: record.name.clone(),
                })?;
    }
    Ok(())
}
