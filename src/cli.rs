//! Command-line interface for the binast container.
//!
//! Thin wiring over the library: load a schema from IDL text, load an AST
//! from a Shift-style JSON dump (or a container), and run the codec. The
//! shared dictionary, when given, is a JSON array of strings.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use binast_schema::Schema;

#[derive(Parser)]
#[command(name = "binast")]
#[command(about = "Encode and decode BinAST containers", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compress a JSON AST dump into a container
    Encode {
        /// IDL file defining the type universe
        #[arg(long)]
        idl: PathBuf,
        /// Shared dictionary: a JSON array of strings
        #[arg(long)]
        dict: Option<PathBuf>,
        /// Root interface of the tree
        #[arg(long, default_value = "Script")]
        root: String,
        /// JSON AST dump to encode
        input: PathBuf,
        /// Container to write
        output: PathBuf,
    },
    /// Decompress a container back into a JSON AST dump
    Decode {
        /// IDL file defining the type universe
        #[arg(long)]
        idl: PathBuf,
        /// Shared dictionary: a JSON array of strings
        #[arg(long)]
        dict: Option<PathBuf>,
        /// Root interface of the tree
        #[arg(long, default_value = "Script")]
        root: String,
        /// Container to decode
        input: PathBuf,
        /// JSON AST dump to write
        output: PathBuf,
    },
}

/// Parses arguments and runs the selected command.
pub fn run_cli() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Encode { idl, dict, root, input, output } => {
            let schema = load_schema(&idl)?;
            let dict = load_dict(dict.as_deref())?;
            let root = lookup_root(&schema, &root)?;
            let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&input)?)?;
            let mut tree = binast_schema::from_json(&schema, &json)?;
            let mut bytes = Vec::new();
            binast_codec::write(&schema, &dict, root, &mut tree, &mut bytes)?;
            fs::write(&output, &bytes)?;
            println!(
                "encoded {} -> {} ({} bytes)",
                input.display(),
                output.display(),
                bytes.len()
            );
        }
        Commands::Decode { idl, dict, root, input, output } => {
            let schema = load_schema(&idl)?;
            let dict = load_dict(dict.as_deref())?;
            let root = lookup_root(&schema, &root)?;
            let bytes = fs::read(&input)?;
            let tree = binast_codec::read(&schema, &dict, root, &mut bytes.as_slice())?;
            let json = binast_schema::to_json(&schema, &tree)?;
            fs::write(&output, serde_json::to_string_pretty(&json)?)?;
            println!("decoded {} -> {}", input.display(), output.display());
        }
    }
    Ok(())
}

fn load_schema(path: &Path) -> Result<Schema, Box<dyn std::error::Error>> {
    Ok(binast_schema::parse_idl(&fs::read_to_string(path)?)?)
}

fn load_dict(path: Option<&Path>) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(serde_json::from_str(&fs::read_to_string(path)?)?),
        None => Ok(Vec::new()),
    }
}

fn lookup_root(
    schema: &Schema,
    name: &str,
) -> Result<binast_schema::TypeId, Box<dyn std::error::Error>> {
    schema
        .interface(name)
        .ok_or_else(|| format!("interface {name} is not defined by the IDL").into())
}
