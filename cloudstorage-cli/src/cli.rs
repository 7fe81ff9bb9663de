use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use argh::FromArgs;
use cloudstorage_client::{ClientBuilder, Config};
use tokio::io::AsyncReadExt;

use crate::config::CliConfig;
use crate::observability;

/// Google Cloud Storage command line client.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    /// tag attached as `trace` parameter to every request
    #[argh(option)]
    pub trace: Option<String>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Read(ReadCommand),
    Write(WriteCommand),
    Stat(StatCommand),
    Whoami(WhoamiCommand),
    Version(VersionCommand),
}

/// A command that talks to the storage service.
#[derive(Debug)]
enum ClientCommand {
    Read(ReadCommand),
    Write(WriteCommand),
    Stat(StatCommand),
    Whoami(WhoamiCommand),
}

impl Command {
    /// Splits off the commands that need a client, or returns `None` for `version`.
    fn into_client_command(self) -> Option<ClientCommand> {
        match self {
            Command::Read(command) => Some(ClientCommand::Read(command)),
            Command::Write(command) => Some(ClientCommand::Write(command)),
            Command::Stat(command) => Some(ClientCommand::Stat(command)),
            Command::Whoami(command) => Some(ClientCommand::Whoami(command)),
            Command::Version(VersionCommand {}) => None,
        }
    }
}

/// write the content of an object to stdout
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "read")]
struct ReadCommand {
    #[argh(positional)]
    bucket: String,
    #[argh(positional)]
    name: String,
}

/// upload a file, or stdin if omitted, as an object
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "write")]
struct WriteCommand {
    /// the content type of the object
    #[argh(option, default = "String::from(\"application/octet-stream\")")]
    content_type: String,
    #[argh(positional)]
    bucket: String,
    #[argh(positional)]
    name: String,
    #[argh(positional)]
    path: Option<PathBuf>,
}

/// print the metadata of an object as JSON
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "stat")]
struct StatCommand {
    #[argh(positional)]
    bucket: String,
    #[argh(positional)]
    name: String,
}

/// print the credential source selected for this environment
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "whoami")]
struct WhoamiCommand {}

/// print the version
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    let Some(command) = args.command.into_client_command() else {
        println!("gcs {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    };

    let mut config = CliConfig::load(args.config.as_deref())?;
    if let Some(trace) = args.trace {
        config.client.trace = Some(trace);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config.logging);
    tracing::debug!(?config);

    runtime.block_on(run(command, config.client))
}

async fn run(command: ClientCommand, config: Config) -> Result<()> {
    let client = ClientBuilder::from_config(config).build().await?;

    match command {
        ClientCommand::Read(ReadCommand { bucket, name }) => {
            let content = client.read_file(&bucket, &name).await?;
            std::io::stdout().lock().write_all(&content)?;
        }
        ClientCommand::Write(WriteCommand {
            content_type,
            bucket,
            name,
            path,
        }) => {
            let content = match path {
                Some(path) => tokio::fs::read(&path).await?,
                None => {
                    let mut buf = Vec::new();
                    tokio::io::stdin().read_to_end(&mut buf).await?;
                    buf
                }
            };
            let object = client
                .write_file(&bucket, &name, content, &content_type)
                .await?;
            println!("{}", serde_json::to_string_pretty(&object)?);
        }
        ClientCommand::Stat(StatCommand { bucket, name }) => {
            let object = client.read_file_metadata(&bucket, &name).await?;
            println!("{}", serde_json::to_string_pretty(&object)?);
        }
        ClientCommand::Whoami(WhoamiCommand {}) => {
            println!("{}", client.credential_source());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::from_args(&["gcs"], args).unwrap()
    }

    #[test]
    fn version_needs_no_client() {
        let args = parse(&["version"]);
        assert!(args.command.into_client_command().is_none());
    }

    #[test]
    fn storage_commands_need_a_client() {
        let args = parse(&["--trace", "email:alice", "read", "bucket", "file.txt"]);
        assert_eq!(args.trace.as_deref(), Some("email:alice"));
        let Some(ClientCommand::Read(ReadCommand { bucket, name })) =
            args.command.into_client_command()
        else {
            panic!("expected read command");
        };
        assert_eq!((bucket.as_str(), name.as_str()), ("bucket", "file.txt"));

        let args = parse(&["write", "--content-type", "text/plain", "bucket", "file.txt"]);
        let Some(ClientCommand::Write(command)) = args.command.into_client_command() else {
            panic!("expected write command");
        };
        assert_eq!(command.content_type, "text/plain");
        assert_eq!(command.path, None);

        for args in [&["stat", "bucket", "file.txt"][..], &["whoami"]] {
            assert!(parse(args).command.into_client_command().is_some());
        }
    }
}
