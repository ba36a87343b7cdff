use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use argh::FromArgs;
use discovery::{Arguments, Snapshot};
use exitcode::ExitCode;

use crate::config::{self, DiscoveryConfig};
use crate::runner::Runner;
use crate::signal::{SignalHandler, SignalTo, os_signals};
use crate::trace;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(FromArgs)]
#[argh(
    description = "discoverd keeps a set of discovered targets up to date and prints it as JSON on every change",
    help_triggers("-h", "--help")
)]
pub struct RootCommand {
    #[argh(switch, short = 'v', description = "show version")]
    version: bool,

    #[argh(
        option,
        short = 'l',
        default = "\"info\".to_string()",
        description = "log level, overridden by DISCOVERD_LOG"
    )]
    log_level: String,

    #[argh(option, short = 'c', description = "read configuration from file")]
    config: Option<PathBuf>,

    #[argh(
        option,
        short = 't',
        description = "specify how many threads the Tokio runtime will use"
    )]
    threads: Option<usize>,

    #[argh(subcommand)]
    sub_commands: Option<SubCommands>,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum SubCommands {
    Validate(Validate),
}

#[derive(FromArgs)]
#[argh(
    subcommand,
    name = "validate",
    description = "Validate the configuration, then exit",
    help_triggers("-h", "--help")
)]
struct Validate {
    #[argh(option, short = 'c', description = "read configuration from file")]
    config: PathBuf,
}

impl RootCommand {
    pub fn run(&self) -> Result<(), ExitCode> {
        if self.version {
            println!("discoverd {VERSION}");
            return Ok(());
        }

        let log_level = std::env::var("DISCOVERD_LOG")
            .unwrap_or_else(|_| trace::directives(&self.log_level));
        trace::init(std::io::stderr().is_terminal(), &log_level);

        if let Some(SubCommands::Validate(validate)) = &self.sub_commands {
            return validate.run();
        }

        let Some(path) = self.config.clone() else {
            error!(message = "no configuration file specified, use --config");
            return Err(exitcode::USAGE);
        };

        let mut builder = tokio::runtime::Builder::new_multi_thread();
        if let Some(threads) = self.threads {
            builder.worker_threads(threads);
        }
        let runtime = builder
            .thread_name("discoverd-worker")
            .enable_io()
            .enable_time()
            .build()
            .map_err(|err| {
                error!(message = "build runtime failed", %err);
                exitcode::OSERR
            })?;

        runtime.block_on(serve(path))?;
        runtime.shutdown_timeout(Duration::from_secs(5));

        Ok(())
    }
}

async fn serve(path: PathBuf) -> Result<(), ExitCode> {
    info!(message = "start discoverd", version = VERSION, config = ?path);

    let (mut signal_handler, mut signal_rx) = SignalHandler::new();
    let signals = os_signals().map_err(|err| {
        error!(message = "set up signal handlers failed", %err);
        exitcode::OSERR
    })?;
    signal_handler.forever(signals);

    let config = config::load(&path).map_err(|err| {
        error!(message = "load config failed", %err);
        exitcode::CONFIG
    })?;
    let mut runner = Runner::start(config.discovery).await.map_err(|err| {
        error!(message = "start discovery failed", %err);
        exitcode::CONFIG
    })?;
    let mut targets = runner.subscribe();

    let graceful = loop {
        tokio::select! {
            Some(signal) = signal_rx.recv() => match signal {
                SignalTo::ReloadFromDisk => {
                    if reload(&path, &mut runner).await {
                        // a replaced backend comes with a new channel
                        targets = runner.subscribe();
                    }
                }
                SignalTo::Shutdown => break true,
                SignalTo::Quit => break false,
            },

            result = targets.changed() => {
                if result.is_err() {
                    // the component is gone, nothing left to export
                    break true;
                }

                let snapshot = targets.borrow_and_update().clone();
                debug!(
                    message = "targets updated",
                    groups = snapshot.len(),
                    phase = ?runner.status().phase
                );
                print_targets(&snapshot);
            }
        }
    };

    if graceful {
        info!(message = "shutdown signal received");

        tokio::select! {
            _ = runner.shutdown() => {},
            // a second signal stops waiting
            _ = signal_rx.recv() => {},
        }
    } else {
        info!(message = "quit signal received");

        drop(runner);
    }

    Ok(())
}

/// Returns true when the backend was replaced.
async fn reload(path: &Path, runner: &mut Runner) -> bool {
    let config = match config::load(path) {
        Ok(config) => config,
        Err(err) => {
            warn!(message = "reload config failed", %err);
            return false;
        }
    };

    match runner.reload(config.discovery).await {
        Ok(replaced) => {
            info!(message = "reload config successes", kind = runner.kind());
            replaced
        }
        Err(err) => {
            warn!(message = "reload config failed, keep running the previous one", %err);
            false
        }
    }
}

fn print_targets(snapshot: &Snapshot) {
    #![allow(clippy::print_stdout)]

    match serde_json::to_string(&**snapshot) {
        Ok(text) => println!("{text}"),
        Err(err) => warn!(message = "encode targets failed", %err),
    }
}

impl Validate {
    fn run(&self) -> Result<(), ExitCode> {
        #![allow(clippy::print_stdout)]

        let config = config::load(&self.config).map_err(|err| {
            println!("x {err}");
            exitcode::CONFIG
        })?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()
            .map_err(|_| exitcode::CANTCREAT)?;

        let result = runtime.block_on(async {
            match &config.discovery {
                DiscoveryConfig::File(arguments) => {
                    arguments.apply_defaults().validate().await.map(|_| ())
                }
                DiscoveryConfig::Static(arguments) => {
                    arguments.apply_defaults().validate().await.map(|_| ())
                }
            }
        });

        match result {
            Ok(()) => {
                println!("√ {} discovery validated", config.discovery.kind());
                Ok(())
            }
            Err(err) => {
                println!("x {err}");
                Err(exitcode::CONFIG)
            }
        }
    }
}
