use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::process;
use std::time::SystemTime;

use clap::Parser;
use rd_core::RdConfig;
use rd_core::Secret;
use rd_core::account;
use rd_core::account::AccountRecord;
use rd_core::account::SystemDirectory;
use rd_core::config;
use rd_core::credential;
use rd_core::credential::CredentialState;
use rd_core::credential::LibcryptHasher;
use rd_core::environment;
use rd_core::environment::SystemEnv;
use rd_core::error::Error;
use rd_core::exec;
use rd_core::identity;
use rd_core::identity::SystemIdentity;
use rd_core::prompt;
use rd_core::prompt::TermiosEcho;
use rd_core::terminal;
use tracing::debug;
use tracing::warn;
use tracing_subscriber::EnvFilter;

const DEFAULT_USER: &str = "root";

/// Every failure exits with this status; success is never observed because
/// the process image is replaced.
const FAILURE_STATUS: i32 = 127;

/// Run a program as another user.
#[derive(Debug, Parser)]
#[command(name = "rd", version, about = "Run a program as another user")]
struct Cli {
    /// Start the program with a cleared environment.
    #[arg(short = 'c')]
    clear_env: bool,

    /// Target account name.
    #[arg(short = 'u', value_name = "USER")]
    user: Option<String>,

    /// Program to run, followed by its arguments.
    #[arg(value_name = "PROGRAM", trailing_var_arg = true)]
    command: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("RD_LOG"))
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();

    // run only comes back on failure: the last thing it does is replace the
    // process image.
    let err = run(cli);
    eprintln!("rd: {err}");
    process::exit(FAILURE_STATUS);
}

fn run(cli: Cli) -> Error {
    match pipeline(cli) {
        Ok(never) => match never {},
        Err(err) => err,
    }
}

fn pipeline(cli: Cli) -> Result<std::convert::Infallible, Error> {
    identity::require_superuser()?;

    if cli.command.is_empty() {
        return Err(Error::NoProgramGiven);
    }

    let config = RdConfig::load(Path::new(config::DEFAULT_CONFIG_PATH))?;
    let user = cli.user.as_deref().unwrap_or(DEFAULT_USER);

    let directory = SystemDirectory;
    let mut record = account::lookup(&directory, user)?;

    if config.require_password {
        let grace = config.grace();
        if grace.as_ref().is_some_and(|g| g.is_fresh(SystemTime::now())) {
            debug!("grace sentinel is fresh; skipping authentication");
        } else {
            account::resolve_credential(&directory, &mut record)?;
            authenticate(&record, &config)?;
            if let Some(grace) = &grace {
                if let Err(err) = grace.record_success() {
                    warn!("unable to update grace sentinel: {err}");
                }
            }
        }
    }

    identity::transition(
        &mut SystemIdentity,
        &record,
        config.init_supplementary_groups,
    )?;
    environment::sanitize(
        &mut SystemEnv,
        &record,
        cli.clear_env,
        config.safe_path.as_deref(),
    );

    Err(exec::replace(&cli.command))
}

fn authenticate(record: &AccountRecord, config: &RdConfig) -> Result<(), Error> {
    let state = CredentialState::parse(&record.credential);
    credential::verify_with(&state, &LibcryptHasher, || read_secret(config))
}

/// Reads the password from the controlling terminal, or from the standard
/// streams when terminal resolution is disabled.
fn read_secret(config: &RdConfig) -> Result<Secret, Error> {
    if config.controlling_terminal {
        let tty = terminal::resolve()?;
        let mut echo = TermiosEcho::new(tty.as_raw_fd());
        let mut reader = &tty;
        let mut writer = &tty;
        prompt::read_secret(&mut reader, &mut writer, &mut echo)
    } else {
        let stdin = io::stdin();
        let mut echo = TermiosEcho::new(stdin.as_raw_fd());
        let mut input = stdin.lock();
        prompt::read_secret(&mut input, &mut io::stderr(), &mut echo)
    }
}
