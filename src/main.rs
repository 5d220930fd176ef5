//! lcp-pack - protect an EPUB for LCP licensing

use std::fs::File;
use std::io::BufWriter;
use std::process::ExitCode;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use lcp_pack::epub::EncryptedData;
use lcp_pack::{Aes256CbcEncrypter, Encrypter, PackConfig, PackedEntry, Packager, read_epub};

#[derive(Parser)]
#[command(name = "lcp-pack")]
#[command(version, about = "Encrypt an EPUB for LCP licensing", long_about = None)]
#[command(after_help = "EXAMPLES:
    lcp-pack book.epub book.lcp.epub            Protect book.epub
    lcp-pack --json book.epub out.epub          Print key and manifest as JSON
    lcp-pack --cleartext OEBPS/cover.jpg a.epub b.epub
                                                Keep the cover in cleartext")]
struct Cli {
    /// Input EPUB
    #[arg(value_name = "INPUT")]
    input: String,

    /// Output EPUB
    #[arg(value_name = "OUTPUT")]
    output: String,

    /// Additional resource paths to leave unencrypted
    #[arg(long = "cleartext", value_name = "PATH")]
    cleartext: Vec<String>,

    /// Deflate level (0-9) applied before encryption
    #[arg(long, default_value_t = 9, value_parser = clap::value_parser!(u32).range(0..=9))]
    compression_level: u32,

    /// Print the content key and manifest as JSON
    #[arg(long)]
    json: bool,

    /// Suppress output messages
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    input: &'a str,
    output: &'a str,
    algorithm: &'a str,
    /// Base64 content key for the license authority.
    content_key: String,
    encryption: Vec<&'a EncryptedData>,
    entries: &'a [PackedEntry],
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let mut epub = read_epub(&cli.input).map_err(|e| e.to_string())?;
    epub.mark_cleartext_all(cli.cleartext.iter().cloned());

    let encrypter = Aes256CbcEncrypter::new();
    let config = PackConfig {
        compression_level: cli.compression_level,
    };

    let output = File::create(&cli.output).map_err(|e| format!("{}: {e}", cli.output))?;
    let packaged = Packager::new(encrypter)
        .with_config(config)
        .pack(epub, BufWriter::new(output));

    let packaged = match packaged {
        Ok(p) => p,
        Err(e) => {
            // Partial output is unusable.
            let _ = std::fs::remove_file(&cli.output);
            return Err(e.to_string());
        }
    };

    if cli.json {
        let report = Report {
            input: &cli.input,
            output: &cli.output,
            algorithm: encrypter.signature_uri(),
            content_key: STANDARD.encode(packaged.key.as_bytes()),
            encryption: packaged.encryption.iter().collect(),
            entries: &packaged.entries,
        };
        let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
        println!("{json}");
    } else if !cli.quiet {
        println!("Input: {}", cli.input);
        println!("Output: {}", cli.output);
        println!("Resources: {}", packaged.entries.len());
        println!("Encrypted: {}", packaged.encryption.len());
        println!("Content key: {}", STANDARD.encode(packaged.key.as_bytes()));
    }

    Ok(())
}
