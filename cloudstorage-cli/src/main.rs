//! Command line client for Google Cloud Storage.
//!
//! Reads, writes and inspects objects using the credential that the environment provides. See
//! [`cloudstorage_client::config`] for the configuration file format.
#![warn(missing_debug_implementations)]

mod cli;
mod config;
mod observability;

fn main() -> anyhow::Result<()> {
    cli::execute()
}
