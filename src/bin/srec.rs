use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use smartrecord::{PeerId, Store, StoreConfig, UpdateOptions, canonical, codec, pretty};
use std::collections::BTreeSet;
use std::fs;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "srec")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pretty-print a marshalled document
    Fmt { file: String },
    /// Print the content id of a marshalled document
    Cid { file: String },
    /// Apply a script of updates to an in-memory store and print the results
    Replay {
        script: String,
        #[arg(long)]
        config: Option<String>,
    },
}

#[derive(Deserialize)]
struct ScriptStep {
    writer: String,
    key: String,
    doc: serde_json::Value,
    #[serde(default)]
    ttl: Option<u64>,
}

fn read_document(file: &str) -> Result<smartrecord::Node> {
    let data = fs::read(file).with_context(|| format!("Failed to read file: {}", file))?;
    Ok(codec::unmarshal(&data)?)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Fmt { file } => {
            let doc = read_document(&file)?;
            println!("{}", pretty::to_pretty_string(&doc));
        }
        Commands::Cid { file } => {
            let doc = read_document(&file)?;
            println!("{}", canonical::content_id(&doc));
        }
        Commands::Replay { script, config } => {
            let config: StoreConfig = match config {
                Some(path) => {
                    let data = fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read config: {}", path))?;
                    serde_json::from_str(&data)?
                }
                None => StoreConfig::default(),
            };
            let data = fs::read_to_string(&script)
                .with_context(|| format!("Failed to read script: {}", script))?;
            let steps: Vec<ScriptStep> = serde_json::from_str(&data)?;

            let store = Store::with_config(smartrecord::Grammar::standard(), config);
            let mut touched = BTreeSet::new();
            for (i, step) in steps.into_iter().enumerate() {
                let doc = codec::unmarshal(&serde_json::to_vec(&step.doc)?)
                    .with_context(|| format!("step {}: bad document", i))?;
                let options = match step.ttl {
                    Some(secs) => UpdateOptions::ttl(Duration::from_secs(secs)),
                    None => UpdateOptions::default(),
                };
                let writer = PeerId::new(step.writer);
                match store.update_with(&writer, &step.key, doc, options) {
                    Ok(()) => println!("step {}: {} updated {:?}", i, writer, step.key),
                    Err(e) => println!("step {}: {} failed: {}", i, writer, e),
                }
                touched.insert(step.key);
            }

            for key in touched {
                println!("{}:", key);
                for (writer, doc) in store.get(&key) {
                    let doc = smartrecord::Node::dict(doc);
                    println!("  {} => {}", writer, pretty::to_pretty_string(&doc));
                }
            }
        }
    }

    Ok(())
}
