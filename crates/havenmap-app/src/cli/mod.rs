use std::path::PathBuf;

use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};

use crate::pipeline::geohash::DEFAULT_PRECISION;

mod validators;

pub use validators::{validate_collection, validate_precision};

/// Top-level CLI entry point.
#[derive(Debug, Default, Parser)]
#[command(
    name = "havenmap",
    version,
    author,
    about = "Import service-listing spreadsheets into a document store"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(global = true, short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn print_help() {
        let mut cmd = Cli::command();
        let _ = cmd.print_help();
        println!();
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import the first sheet of a workbook, geocoding rows without coordinates.
    Import(ImportArgs),
    /// Print a stored record.
    Get(GetArgs),
    /// List stored record ids.
    List(ListArgs),
    /// Encode or decode geohashes.
    #[command(subcommand)]
    Geohash(GeohashCommands),
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Workbook to import (xlsx, xlsm, xlsb, xls or ods).
    #[arg(value_name = "FILE")]
    pub input: PathBuf,
    /// Geocoding API key; overrides `geocoding.api_key` from configuration.
    #[arg(long, env = "HAVENMAP_GEOCODING_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    /// Target collection; overrides `storage.collection`.
    #[arg(long, value_parser = validate_collection)]
    pub collection: Option<String>,
    /// Do not append stored records to the import manifest.
    #[arg(long)]
    pub no_manifest: bool,
}

#[derive(Debug, Args)]
pub struct GetArgs {
    /// Record identifier.
    pub id: String,
    #[arg(long, value_parser = validate_collection)]
    pub collection: Option<String>,
    /// Pretty-print the JSON output.
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long, value_parser = validate_collection)]
    pub collection: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum GeohashCommands {
    /// Encode a latitude/longitude pair.
    Encode(GeohashEncodeArgs),
    /// Decode a geohash into its center and error margins.
    Decode(GeohashDecodeArgs),
}

#[derive(Debug, Args)]
pub struct GeohashEncodeArgs {
    #[arg(allow_negative_numbers = true)]
    pub latitude: f64,
    #[arg(allow_negative_numbers = true)]
    pub longitude: f64,
    /// Number of characters in the hash.
    #[arg(long, default_value_t = DEFAULT_PRECISION, value_parser = validate_precision)]
    pub precision: usize,
}

#[derive(Debug, Args)]
pub struct GeohashDecodeArgs {
    pub hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_import_flags() {
        let cli = <Cli as Parser>::try_parse_from([
            "havenmap",
            "-v",
            "import",
            "sheet.xlsx",
            "--api-key",
            "k",
            "--no-manifest",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        let Some(Commands::Import(args)) = cli.command else {
            panic!("expected import");
        };
        assert_eq!(args.input, PathBuf::from("sheet.xlsx"));
        assert_eq!(args.api_key.as_deref(), Some("k"));
        assert!(args.no_manifest);
        assert!(args.collection.is_none());
    }

    #[test]
    fn geohash_encode_accepts_negative_coordinates() {
        let cli = <Cli as Parser>::try_parse_from([
            "havenmap", "geohash", "encode", "42.6", "-5.6", "--precision", "5",
        ])
        .unwrap();
        let Some(Commands::Geohash(GeohashCommands::Encode(args))) = cli.command else {
            panic!("expected geohash encode");
        };
        assert_eq!((args.latitude, args.longitude, args.precision), (42.6, -5.6, 5));
    }

    #[test]
    fn geohash_precision_is_bounded() {
        assert!(
            <Cli as Parser>::try_parse_from(["havenmap", "geohash", "encode", "0", "0", "--precision", "13"])
                .is_err()
        );
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
