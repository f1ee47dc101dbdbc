use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{extract::Category, load::OutputMode, transform::HeaderPolicy};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Build per-invoice JSON documents from ERP spreadsheet exports",
    long_about = None
)]
pub struct Cli {
    /// YAML configuration file; defaults apply to anything it omits
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Directory for the rotating log file (overrides logging.directory)
    #[arg(long = "log-dir", global = true)]
    pub log_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Extract, join and reshape the four sources, then write invoice JSON
    Run(RunArgs),
    /// Show the first rows of one source after column normalization and filtering
    Preview(PreviewArgs),
}

#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// Root directory holding facturas/, clientes/, lineas_pedidos/ and pedidos/
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,
    /// Output path template; `placeholder` in the file name is replaced per invoice
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Write one file per invoice or a single combined document
    #[arg(long = "output-mode", value_enum)]
    pub output_mode: Option<OutputMode>,
    /// What to do when rows of one invoice disagree on header fields
    #[arg(long = "header-policy", value_enum)]
    pub header_policy: Option<HeaderPolicy>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long)]
    pub delimiter: Option<String>,
    /// Character encoding of CSV sources (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// Source to preview
    #[arg(long, value_enum)]
    pub category: Category,
    /// Number of rows to display
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
    #[command(flatten)]
    pub run: RunArgs,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_delimiter_accepts_names_and_symbols() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter(";"), Ok(b';'));
        assert_eq!(parse_delimiter("#"), Ok(b'#'));
        assert!(parse_delimiter("").is_err());
        assert!(parse_delimiter("ab").is_err());
        assert!(parse_delimiter("é").is_err());
    }

    #[test]
    fn run_flags_parse_into_overrides() {
        let cli = Cli::parse_from([
            "facturas-etl",
            "--log-dir",
            "/tmp/logs",
            "run",
            "--data-dir",
            "exports",
            "--output-mode",
            "combined",
            "--header-policy",
            "pick-first",
        ]);
        assert_eq!(cli.log_dir, Some(PathBuf::from("/tmp/logs")));
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.data_dir, Some(PathBuf::from("exports")));
        assert_eq!(args.output_mode, Some(OutputMode::Combined));
        assert_eq!(args.header_policy, Some(HeaderPolicy::PickFirst));
    }

    #[test]
    fn preview_requires_known_category() {
        let cli = Cli::parse_from(["facturas-etl", "preview", "--category", "order-lines"]);
        let Commands::Preview(args) = cli.command else {
            panic!("expected preview command");
        };
        assert_eq!(args.category, Category::OrderLines);
        assert_eq!(args.rows, 10);
        assert!(Cli::try_parse_from(["facturas-etl", "preview", "--category", "bogus"]).is_err());
    }
}
