use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;
use crate::error::Result;
use crate::grace::GraceSentinel;

/// Default location of the optional configuration file. Must only be
/// writable by the superuser, like the binary itself.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/rd.toml";

const DEFAULT_GRACE_SENTINEL: &str = "/etc/rd";

/// Runtime behavior toggles. Historically these were build-time variants of
/// the tool; here a missing config file just yields the defaults.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RdConfig {
    /// Authenticate the invoker before transitioning. Default: `true`.
    pub require_password: bool,

    /// Prompt on the process's controlling terminal instead of the standard
    /// streams. Default: `true`.
    pub controlling_terminal: bool,

    /// Initialize supplementary group membership for the target account
    /// during the transition. Default: `true`.
    pub init_supplementary_groups: bool,

    /// How long a successful authentication stays valid, in seconds.
    /// Absent: the grace cache is disabled and every invocation prompts.
    pub grace_period_secs: Option<u64>,

    /// Where the grace sentinel lives. Default: `/etc/rd`.
    pub grace_sentinel: PathBuf,

    /// Force `PATH` to this value after sanitizing. Absent: `PATH` is left
    /// as the invoker had it (or as preserved across a clear).
    pub safe_path: Option<String>,
}

impl Default for RdConfig {
    fn default() -> Self {
        Self {
            require_password: true,
            controlling_terminal: true,
            init_supplementary_groups: true,
            grace_period_secs: None,
            grace_sentinel: PathBuf::from(DEFAULT_GRACE_SENTINEL),
            safe_path: None,
        }
    }
}

impl RdConfig {
    /// Loads the config file, treating a missing file as the defaults. Any
    /// other read or parse failure is fatal: a root-owned config that fails
    /// to parse should not silently degrade to default behavior.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => toml::from_str(&text).map_err(|source| Error::ConfigParse {
                path: path.to_path_buf(),
                source,
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(Error::ConfigRead {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// The grace cache, when enabled.
    pub fn grace(&self) -> Option<GraceSentinel> {
        self.grace_period_secs.map(|secs| {
            GraceSentinel::new(self.grace_sentinel.clone(), Duration::from_secs(secs))
        })
    }
}
