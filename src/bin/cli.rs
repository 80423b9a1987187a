//! BlockKV CLI
//!
//! Command-line interface for inspecting and editing a tree file of UTF-8
//! string keys and values.

use std::fs;
use std::ops::Bound;
use std::path::PathBuf;

use blockkv::{BPlusTree, PointerWidth, Result, TreeConfig, ValueStorage};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

type StringTree = BPlusTree<String, String>;

/// BlockKV CLI
#[derive(Parser, Debug)]
#[command(name = "blockkv-cli")]
#[command(about = "Inspect and edit a BlockKV tree file")]
#[command(version)]
struct Args {
    /// Tree file (created on first write if missing)
    #[arg(short, long, default_value = "./blockkv.db")]
    file: PathBuf,

    /// Block size in bytes for new files
    #[arg(short, long, default_value = "4096")]
    block_size: usize,

    /// Store values longer than this many bytes in overflow blocks (new files)
    #[arg(long)]
    overflow_threshold: Option<usize>,

    /// Nodes kept in the node cache
    #[arg(long, default_value = "256")]
    cache_blocks: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Set a key-value pair
    Put {
        key: String,
        value: String,
    },

    /// Get a value by key
    Get {
        key: String,
    },

    /// Delete a key
    Del {
        key: String,
    },

    /// Print entries in key order
    Scan {
        /// Inclusive lower bound
        #[arg(long)]
        from: Option<String>,

        /// Exclusive upper bound
        #[arg(long)]
        to: Option<String>,

        /// Walk from the upper end down
        #[arg(short, long)]
        reverse: bool,

        /// Stop after this many entries
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print tree and file statistics
    Stats,

    /// Bulk-load tab-separated `key<TAB>value` lines
    Load {
        input: PathBuf,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("Command failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = TreeConfig::builder()
        .block_size(args.block_size)
        .pointer_width(if args.block_size > PointerWidth::Normal.max_block_size() {
            PointerWidth::Large
        } else {
            PointerWidth::Normal
        })
        .value_storage(match args.overflow_threshold {
            Some(threshold) => ValueStorage::Overflow { threshold },
            None => ValueStorage::Inline,
        })
        .cache_blocks(args.cache_blocks)
        .build();

    let mut tree: StringTree = if args.file.exists() {
        BPlusTree::open(&args.file, config)?
    } else {
        BPlusTree::create(&args.file, config)?
    };

    match args.command {
        Commands::Put { key, value } => {
            if tree.put(key, value)?.is_some() {
                println!("(replaced)");
            }
            println!("OK");
        }

        Commands::Get { key } => match tree.get(&key)? {
            Some(value) => println!("{}", value),
            None => println!("(nil)"),
        },

        Commands::Del { key } => match tree.remove(&key)? {
            Some(_) => println!("(deleted)"),
            None => println!("(nil)"),
        },

        Commands::Scan {
            from,
            to,
            reverse,
            limit,
        } => {
            let lower = from.map_or(Bound::Unbounded, Bound::Included);
            let upper = to.map_or(Bound::Unbounded, Bound::Excluded);
            let limit = limit.unwrap_or(usize::MAX);
            for entry in tree.range((lower, upper), reverse)?.take(limit) {
                let (key, value) = entry?;
                println!("{}\t{}", key, value);
            }
        }

        Commands::Stats => {
            let stats = tree.store_stats();
            println!("keys:         {}", tree.len());
            println!("height:       {}", tree.height());
            println!("block size:   {}", stats.block_size);
            println!("blocks:       {}", stats.block_count);
            println!("live blocks:  {}", stats.live_blocks());
            println!("free blocks:  {}", stats.free_blocks);
        }

        Commands::Load { input } => {
            let text = fs::read_to_string(&input)?;
            let mut loaded = 0u64;
            for (line_no, line) in text.lines().enumerate() {
                if line.is_empty() {
                    continue;
                }
                match line.split_once('\t') {
                    Some((key, value)) => {
                        tree.put(key.to_string(), value.to_string())?;
                        loaded += 1;
                    }
                    None => tracing::warn!("Skipping line {}: no tab separator", line_no + 1),
                }
            }
            println!("Loaded {} entries", loaded);
        }
    }

    tree.close()
}
