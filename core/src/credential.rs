use std::ffi::CStr;
use std::ffi::CString;
use std::io;

use constant_time_eq::constant_time_eq;
use zeroize::Zeroize;

use crate::error::Error;
use crate::error::Result;
use crate::secret::Secret;

/// What the stored credential field means for authentication, computed
/// exactly once from the resolved account record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialState {
    /// No password required.
    Empty,
    /// Authentication must always fail.
    Locked,
    /// A salted hash to verify the entered secret against.
    Hashed { stored: String },
}

impl CredentialState {
    pub fn parse(field: &str) -> Self {
        if field.is_empty() {
            CredentialState::Empty
        } else if field.starts_with('!') || field.starts_with('*') {
            CredentialState::Locked
        } else {
            CredentialState::Hashed {
                stored: field.to_string(),
            }
        }
    }
}

/// Extracts the crypt(3) setting (scheme and salt) from a stored hash:
/// everything up to and including the second `$` past the leading one.
/// Values with fewer delimiters are used whole, so DES-style two-character
/// salts and salt-only strings still work.
pub fn crypt_setting(stored: &str) -> &str {
    let mut delimiters = 0;
    for (idx, byte) in stored.bytes().enumerate().skip(1) {
        if byte == b'$' {
            delimiters += 1;
            if delimiters == 2 {
                return &stored[..=idx];
            }
        }
    }
    stored
}

/// Computes the salted hash of a secret under a given setting. The trait
/// seam lets verification be tested without libcrypt.
pub trait SecretHasher {
    fn hash(&self, secret: &[u8], setting: &str) -> io::Result<String>;
}

#[link(name = "crypt")]
unsafe extern "C" {
    fn crypt(key: *const libc::c_char, setting: *const libc::c_char) -> *mut libc::c_char;
}

/// Hasher backed by `crypt(3)` from libcrypt.
pub struct LibcryptHasher;

impl SecretHasher for LibcryptHasher {
    fn hash(&self, secret: &[u8], setting: &str) -> io::Result<String> {
        let key = CString::new(secret).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "password contains an interior NUL byte",
            )
        })?;
        let setting = CString::new(setting).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "stored credential contains an interior NUL byte",
            )
        })?;

        // SAFETY: both pointers are NUL-terminated and outlive the call;
        // crypt returns NULL or a pointer to static storage that is copied
        // out before the next call.
        let output = unsafe { crypt(key.as_ptr(), setting.as_ptr()) };
        let result = if output.is_null() {
            Err(io::Error::last_os_error())
        } else {
            Ok(unsafe { CStr::from_ptr(output) }
                .to_string_lossy()
                .into_owned())
        };

        let mut key = key.into_bytes();
        key.zeroize();
        result
    }
}

/// Runs the single authentication check. The secret is only requested (via
/// `read_secret`) when the credential state actually needs one: an empty
/// credential succeeds without input and a locked credential fails before
/// any prompt is shown.
pub fn verify_with<F>(state: &CredentialState, hasher: &dyn SecretHasher, read_secret: F) -> Result<()>
where
    F: FnOnce() -> Result<Secret>,
{
    match state {
        CredentialState::Empty => Ok(()),
        CredentialState::Locked => Err(Error::AccountLocked),
        CredentialState::Hashed { stored } => {
            let secret = read_secret()?;
            let computed = hasher
                .hash(secret.as_bytes(), crypt_setting(stored))
                .map_err(|source| Error::Hashing { source })?;
            // The freshly computed full hash string must equal the stored
            // one; compared in constant time to avoid a timing side-channel.
            if constant_time_eq(computed.as_bytes(), stored.as_bytes()) {
                Ok(())
            } else {
                Err(Error::IncorrectPassword)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;
    use std::io;

    use pretty_assertions::assert_eq;

    use super::CredentialState;
    use super::SecretHasher;
    use super::crypt_setting;
    use super::verify_with;
    use crate::error::Error;
    use crate::secret::Secret;

    /// Deterministic stand-in for crypt(3): "hashes" by concatenating the
    /// setting and the secret, and counts invocations.
    struct FakeHasher {
        calls: Cell<usize>,
    }

    impl FakeHasher {
        fn new() -> Self {
            Self {
                calls: Cell::new(0),
            }
        }
    }

    impl SecretHasher for FakeHasher {
        fn hash(&self, secret: &[u8], setting: &str) -> io::Result<String> {
            self.calls.set(self.calls.get() + 1);
            Ok(format!("{setting}{}", String::from_utf8_lossy(secret)))
        }
    }

    fn secret(bytes: &[u8]) -> Secret {
        Secret::from_bytes(bytes).unwrap()
    }

    #[test]
    fn parses_all_credential_states() {
        assert_eq!(CredentialState::parse(""), CredentialState::Empty);
        assert_eq!(CredentialState::parse("!"), CredentialState::Locked);
        assert_eq!(
            CredentialState::parse("!$6$salt$digest"),
            CredentialState::Locked
        );
        assert_eq!(CredentialState::parse("*"), CredentialState::Locked);
        assert_eq!(
            CredentialState::parse("$6$salt$digest"),
            CredentialState::Hashed {
                stored: "$6$salt$digest".to_string()
            }
        );
    }

    #[test]
    fn setting_extraction_truncates_after_second_delimiter() {
        assert_eq!(crypt_setting("$6$salt$digest"), "$6$salt$");
        assert_eq!(crypt_setting("$6$salt$digest$extra"), "$6$salt$");
        assert_eq!(crypt_setting("$6$salt"), "$6$salt");
        assert_eq!(crypt_setting("$6$"), "$6$");
        assert_eq!(crypt_setting("ab0123456789"), "ab0123456789");
        assert_eq!(crypt_setting(""), "");
    }

    #[test]
    fn empty_credential_succeeds_without_reading_a_secret() {
        let hasher = FakeHasher::new();
        verify_with(&CredentialState::Empty, &hasher, || {
            panic!("secret must not be requested")
        })
        .unwrap();
        assert_eq!(hasher.calls.get(), 0);
    }

    #[test]
    fn locked_credential_fails_without_reading_a_secret() {
        let hasher = FakeHasher::new();
        let err = verify_with(&CredentialState::Locked, &hasher, || {
            panic!("secret must not be requested")
        })
        .unwrap_err();
        assert!(matches!(err, Error::AccountLocked));
        assert_eq!(hasher.calls.get(), 0);
    }

    #[test]
    fn correct_secret_verifies() {
        let hasher = FakeHasher::new();
        let state = CredentialState::parse("$6$salt$hunter2");
        verify_with(&state, &hasher, || Ok(secret(b"hunter2"))).unwrap();
        assert_eq!(hasher.calls.get(), 1);
    }

    #[test]
    fn one_character_difference_fails() {
        let hasher = FakeHasher::new();
        let state = CredentialState::parse("$6$salt$hunter2");
        let err = verify_with(&state, &hasher, || Ok(secret(b"hunter3"))).unwrap_err();
        assert!(matches!(err, Error::IncorrectPassword));
    }

    #[test]
    fn prompt_failure_propagates_before_hashing() {
        let hasher = FakeHasher::new();
        let state = CredentialState::parse("$6$salt$hunter2");
        let err = verify_with(&state, &hasher, || {
            Err(Error::Read {
                source: io::Error::new(io::ErrorKind::BrokenPipe, "gone"),
            })
        })
        .unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
        assert_eq!(hasher.calls.get(), 0);
    }
}
