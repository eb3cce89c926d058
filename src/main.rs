use clap::{Parser, Subcommand};
use graphark::{Archive, DumpOptions};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "graphark", about = "Inspect graph archives")]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show header, section ranges and table sizes
    Info {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// List persisted type names and versions
    Types {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print the block stream and flattened tree
    Dump {
        input: PathBuf,
        /// Only the linear block stream
        #[arg(long)]
        blocks: bool,
        /// Only the flattened tree and object map
        #[arg(long)]
        tree: bool,
        /// Payload bytes shown per binary block (0 hides payloads)
        #[arg(long, default_value = "16")]
        preview: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    match cli.command {

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, json } => {
            let ar   = Archive::open(&input)?;
            let info = ar.info()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
                return Ok(());
            }

            println!("── graph archive ────────────────────────────────────────");
            println!("  Path            {}", input.display());
            println!("  Format version  {}{}", info.format_version, if info.legacy { " (legacy)" } else { "" });
            println!("  User version    {}", info.user_version);
            println!("  Packed integers {}", info.packed_integers);
            println!("  Size            {} B", info.total_bytes);
            for section in &info.sections {
                println!("  {:<15} {}..{} ({} B)",
                    format!("{:?}", section.section), section.start, section.end,
                    section.end - section.start);
            }
            println!("  Blocks          {}", info.blocks);
            println!("  Objects         {}", info.objects);
            println!("  Types           {}", info.types);
            println!("  Keys            {}", info.keys);
        }

        // ── Types ────────────────────────────────────────────────────────────
        Commands::Types { input, json } => {
            let ar    = Archive::open(&input)?;
            let types = ar.persisted_types()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&types)?);
                return Ok(());
            }
            println!("{:>4}  {:<48} {:>7}", "Id", "Name", "Version");
            for entry in &types {
                println!("{:>4}  {:<48} {:>7}", entry.id, entry.name, entry.version);
            }
        }

        // ── Dump ─────────────────────────────────────────────────────────────
        Commands::Dump { input, blocks, tree, preview } => {
            let ar = Archive::open(&input)?;
            // Neither flag means both.
            let both = !blocks && !tree;
            let options = DumpOptions {
                blocks:          blocks || both,
                tree:            tree || both,
                payload_preview: preview,
            };
            print!("{}", ar.dump(&options)?);
        }
    }

    Ok(())
}
