//! # CLI Module
//!
//! Command-line front end for the `brrtd` binary.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! Start the TCP server with the standard handlers:
//!
//! ```bash
//! brrtd serve --config brrtd.yaml --bind 0.0.0.0:8080 --user admin:secret
//! ```
//!
//! Options:
//! - `--config <FILE>` - YAML configuration (also `BRRTD_CONFIG`)
//! - `--bind <ADDR>` - listen address, overrides the file and environment
//! - `--workers <N>` - dispatch worker threads
//! - `--acceptors <N>` - acceptor threads
//! - `--shutdown <MODE>` - `graceful` or `forceful`
//! - `--user <NAME:PASSWORD>` - seed a login user (repeatable)
//!
//! The server runs until SIGINT or SIGTERM.
//!
//! ### `routes`
//!
//! Show which registry entry each path resolves to:
//!
//! ```bash
//! brrtd routes /version /login/web /nowhere
//! ```
//!
//! ## Usage from Code
//!
//! ```rust,ignore
//! use brrtdispatch::cli::{run_cli, Cli};
//! use clap::Parser;
//!
//! run_cli(Cli::parse())?;
//! ```

mod commands;


pub use commands::{run_cli, Cli, Commands};
