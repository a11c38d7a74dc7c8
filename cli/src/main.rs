//! Command line access to a stackdbd daemon.
//!
//! Talks to the binary RPC endpoint, or to the RPC-over-HTTP endpoint with
//! `--http`. Bodies go through stdin/stdout; headers and listings headers go to
//! stderr so the output can be piped.

use anyhow::Result;
use chrono::SecondsFormat;
use clap::{Parser, Subcommand};
use stackdb::rpc::client::RpcClient;
use stackdb::service::types::{DataResult, Headers, SectionInfo};
use std::io::{Read, Write};

#[derive(Parser, Debug)]
#[command(name = "stackdb-cli", about = "Command line access to file stack database")]
struct Cli {
    /// Use RPC over HTTP instead of raw TCP.
    #[arg(long, global = true)]
    http: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Push stdin as a message, with optional `header=value` pairs.
    Push {
        address: String,
        section: String,
        headers: Vec<String>,
    },
    /// Print the last message without removing it.
    #[command(visible_alias = "peak")]
    Peek { address: String, section: String },
    /// Print and remove the last message.
    Pop { address: String, section: String },
    /// List sections whose name starts with the prefix.
    Sections {
        address: String,
        #[arg(default_value = "")]
        prefix: String,
    },
}

impl Command {
    fn address(&self) -> &str {
        match self {
            Command::Push { address, .. }
            | Command::Peek { address, .. }
            | Command::Pop { address, .. }
            | Command::Sections { address, .. } => address,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let client = if cli.http {
        RpcClient::http(cli.command.address())
    } else {
        RpcClient::connect_tcp(cli.command.address()).await?
    };

    match cli.command {
        Command::Push {
            section, headers, ..
        } => {
            let mut body = Vec::new();
            std::io::stdin().read_to_end(&mut body)?;
            let depth = client.push(&section, parse_headers(&headers), body).await?;
            println!("{}", depth);
        }
        Command::Peek { section, .. } => {
            let result = client.peek(&section).await?;
            print_message(&result)?;
        }
        Command::Pop { section, .. } => {
            let result = client.pop(&section).await?;
            print_message(&result)?;
        }
        Command::Sections { prefix, .. } => {
            let sections = client.sections(&prefix).await?;
            eprintln!("num name depth last-access");
            for (num, section) in sections.iter().enumerate() {
                println!("{}", section_line(num, section));
            }
        }
    }

    Ok(())
}

/// `key=value` pairs; arguments without `=` are ignored.
fn parse_headers(args: &[String]) -> Headers {
    args.iter()
        .filter_map(|arg| arg.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn print_message(result: &DataResult) -> Result<()> {
    let mut headers: Vec<_> = result.message.headers.iter().collect();
    headers.sort();
    for (key, value) in headers {
        eprintln!("{}={}", key, value);
    }

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&result.message.body)?;
    stdout.flush()?;
    Ok(())
}

fn section_line(num: usize, section: &SectionInfo) -> String {
    format!(
        "{} {} {} {}",
        num,
        section.name,
        section.depth,
        section
            .last_access
            .to_rfc3339_opts(SecondsFormat::AutoSi, true)
    )
}
