use std::env;

use crate::account::AccountRecord;

/// Shell used when the account record does not carry one.
pub const DEFAULT_SHELL: &str = "/bin/sh";

const PRESERVED_ON_CLEAR: [&str; 2] = ["TERM", "PATH"];

/// The process environment table as an explicit collaborator instead of a
/// process-wide implicit global, so sanitization is testable against an
/// in-memory table.
pub trait ProcessEnv {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
    fn clear(&mut self);
}

/// The real process environment.
pub struct SystemEnv;

impl ProcessEnv for SystemEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }

    fn set(&mut self, key: &str, value: &str) {
        // SAFETY: the process is single-threaded for its whole life; nothing
        // can be reading the environment concurrently.
        unsafe { env::set_var(key, value) };
    }

    fn clear(&mut self) {
        let keys: Vec<_> = env::vars_os().map(|(key, _)| key).collect();
        for key in keys {
            // SAFETY: single-threaded process, as above.
            unsafe { env::remove_var(&key) };
        }
    }
}

/// Rebuilds the downstream environment from the target account. Clear mode
/// throws away everything the invoker supplied except `TERM` and `PATH`;
/// the account-derived variables are always set so the invoked program gets
/// a correct, minimal account context either way.
pub fn sanitize(
    env: &mut dyn ProcessEnv,
    account: &AccountRecord,
    clear: bool,
    safe_path: Option<&str>,
) {
    if clear {
        let preserved: Vec<(&str, Option<String>)> = PRESERVED_ON_CLEAR
            .iter()
            .map(|&key| (key, env.get(key)))
            .collect();
        env.clear();
        for (key, value) in preserved {
            if let Some(value) = value {
                env.set(key, &value);
            }
        }
    }

    env.set("HOME", &account.home);
    let shell = if account.shell.is_empty() {
        DEFAULT_SHELL
    } else {
        &account.shell
    };
    env.set("SHELL", shell);
    env.set("USER", &account.name);
    env.set("LOGNAME", &account.name);

    if let Some(path) = safe_path {
        env.set("PATH", path);
    }
}
