use zeroize::Zeroize;

use crate::error::Error;
use crate::error::Result;

/// Increment by which the buffer grows, and the read chunk size used by the
/// prompt. Growing by a fixed step bounds reallocation frequency while
/// keeping memory proportional to input length.
pub const GROWTH: usize = 64;

/// An entered password. The backing storage is wiped on drop and whenever an
/// internal reallocation retires an old buffer, so no copy of the secret
/// outlives this value.
pub struct Secret {
    bytes: Vec<u8>,
}

impl Secret {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Builds a secret from existing bytes, chunked through the same growth
    /// path the prompt uses.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut secret = Self::new();
        for chunk in bytes.chunks(GROWTH) {
            secret.push_chunk(chunk)?;
        }
        Ok(secret)
    }

    /// Appends a chunk of at most [`GROWTH`] bytes, growing the buffer by
    /// one increment when it would not fit.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        debug_assert!(chunk.len() <= GROWTH);
        if self.bytes.len() + chunk.len() > self.bytes.capacity() {
            self.grow()?;
        }
        self.bytes.extend_from_slice(chunk);
        Ok(())
    }

    fn grow(&mut self) -> Result<()> {
        let mut grown: Vec<u8> = Vec::new();
        grown
            .try_reserve_exact(self.bytes.capacity() + GROWTH)
            .map_err(|_| Error::Allocation)?;
        grown.extend_from_slice(&self.bytes);
        let mut retired = std::mem::replace(&mut self.bytes, grown);
        wipe(&mut retired);
        Ok(())
    }

    /// Drops a single trailing line terminator, if present.
    pub fn strip_newline(&mut self) {
        if self.bytes.last() == Some(&b'\n') {
            self.bytes.pop();
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Default for Secret {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        wipe(&mut self.bytes);
    }
}

// The password must never end up in logs or error output.
impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

/// Zeroes the full capacity, not just the initialized prefix: popped bytes
/// and spare capacity may still hold secret material.
fn wipe(bytes: &mut Vec<u8>) {
    let capacity = bytes.capacity();
    bytes.resize(capacity, 0);
    bytes.as_mut_slice().zeroize();
    bytes.clear();
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::GROWTH;
    use super::Secret;

    #[test]
    fn push_chunk_accumulates_across_growth_boundaries() {
        let mut secret = Secret::new();
        let data = vec![b'a'; GROWTH * 3 + 7];
        for chunk in data.chunks(GROWTH) {
            secret.push_chunk(chunk).unwrap();
        }
        assert_eq!(secret.as_bytes(), data.as_slice());
    }

    #[test]
    fn strip_newline_removes_only_one_terminator() {
        let mut secret = Secret::from_bytes(b"hunter2\n").unwrap();
        secret.strip_newline();
        assert_eq!(secret.as_bytes(), b"hunter2");

        let mut secret = Secret::from_bytes(b"hunter2\n\n").unwrap();
        secret.strip_newline();
        assert_eq!(secret.as_bytes(), b"hunter2\n");

        let mut secret = Secret::from_bytes(b"hunter2").unwrap();
        secret.strip_newline();
        assert_eq!(secret.as_bytes(), b"hunter2");
    }

    #[test]
    fn empty_secret_is_permitted() {
        let mut secret = Secret::new();
        secret.strip_newline();
        assert!(secret.is_empty());
        assert_eq!(secret.len(), 0);
    }

    #[test]
    fn debug_output_never_contains_the_secret() {
        let secret = Secret::from_bytes(b"hunter2").unwrap();
        let rendered = format!("{secret:?}");
        assert!(!rendered.contains("hunter2"));
    }
}
