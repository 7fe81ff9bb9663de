//! # Cloud Storage Client
//!
//! A thin client for the Google Cloud Storage JSON API. It picks a credential from the runtime
//! environment, authorizes every request with a fresh access token, and translates error
//! responses of the service into the typed [`Error`] taxonomy.
//!
//! ## Usage
//!
//! ```no_run
//! use cloudstorage_client::{Client, Error};
//!
//! #[tokio::main]
//! # async fn main() -> cloudstorage_client::Result<()> {
//!     let client = Client::builder()
//!         .token_file("/home/alice/.storage.json")
//!         .trace("email:alice")
//!         .build()
//!         .await?;
//!
//!     client
//!         .write_file("my-bucket", "greeting.txt", "Hello, world!", "text/plain")
//!         .await?;
//!
//!     match client.read_file("my-bucket", "missing.txt").await {
//!         Ok(content) => println!("{} bytes", content.len()),
//!         Err(Error::NotFound { .. }) => println!("not there"),
//!         Err(error) => return Err(error),
//!     }
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod classify;
mod client;
pub mod config;
pub mod credentials;
pub mod environment;
mod error;
pub mod resources;
mod transport;
#[allow(missing_docs)]
pub mod types;

pub use client::*;
pub use config::Config;
pub use environment::Environment;
pub use error::*;
pub use transport::PARAM_TRACE;

#[cfg(test)]
mod tests;
