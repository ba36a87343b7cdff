#[macro_use]
extern crate tracing;

mod config;
mod launch;
mod runner;
mod signal;
mod trace;

use launch::RootCommand;

fn main() {
    let root: RootCommand = argh::from_env();

    if let Err(code) = root.run() {
        std::process::exit(code);
    }
}
