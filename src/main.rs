use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use myst::config::{ClientConfig, NodeConfig, UploadOptions, DEFAULT_DIRECTORY_URL};
use myst::error::Result;
use myst::manifest::RecoveryManifest;
use myst::net::directory::DirectoryClient;
use myst::net::selection;
use myst::net::transport::NodeClient;
use myst::pipeline;

#[derive(Parser)]
#[command(name = "myst")]
#[command(about = "Zero-knowledge scattered storage: erasure-coded, doubly-encrypted fragments across untrusted nodes")]
#[command(version)]
struct Cli {
    /// Directory server URL
    #[arg(long, global = true, default_value = DEFAULT_DIRECTORY_URL)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt, shard and scatter a file; writes <file>.myst
    Upload {
        file: PathBuf,
        /// Number of data partitions
        #[arg(long, default_value_t = 10)]
        partitions: usize,
        /// Fragment replicas per shard
        #[arg(long, default_value_t = 3)]
        redundancy: usize,
        /// Bind the manifest to a password instead of embedding the key
        #[arg(long)]
        master_password: Option<String>,
        /// Skip DEFLATE of the master ciphertext
        #[arg(long)]
        no_compression: bool,
        /// Skip Reed-Solomon parity shards
        #[arg(long)]
        no_reed_solomon: bool,
    },
    /// Reconstruct a file from its recovery manifest
    Download {
        manifest: PathBuf,
        /// Output path (defaults to the original name next to the manifest)
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[arg(long)]
        master_password: Option<String>,
    },
    /// Probe fragment availability for a manifest
    Verify { manifest: PathBuf },
    /// Print a manifest summary without touching the network
    Info { manifest: PathBuf },
    /// Network overview as reported by the directory
    Stats,
    /// Print the effective client configuration
    Config,
    /// Connectivity check: directory reachability and node latencies
    Test,
    /// Run a storage node
    Node {
        /// Fragment storage directory
        #[arg(long, default_value = "./myst-storage")]
        storage_dir: PathBuf,
        #[arg(long, default_value_t = 5001)]
        port: u16,
        /// Address other peers use to reach this node
        #[arg(long, default_value = "127.0.0.1")]
        advertise_address: String,
        /// Offered capacity in bytes
        #[arg(long, default_value_t = 10 * 1024 * 1024 * 1024)]
        capacity: u64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = ClientConfig::with_directory(cli.server.clone());

    match cli.command {
        Commands::Upload {
            file,
            partitions,
            redundancy,
            master_password,
            no_compression,
            no_reed_solomon,
        } => {
            let options = UploadOptions {
                partitions,
                redundancy,
                compression: !no_compression,
                reed_solomon: !no_reed_solomon,
                master_password,
            };
            let result = pipeline::run_upload(&file, &options, &config).await?;
            println!(
                "Uploaded {} as {} fragments across the network",
                file.display(),
                result.fragments_stored
            );
            println!("Recovery manifest: {}", result.manifest_path.display());
            if result.manifest.is_password_protected() {
                println!("The manifest is password-bound; keep both safe.");
            } else {
                println!("The manifest contains all keys; keep it safe.");
            }
        }

        Commands::Download {
            manifest,
            output,
            master_password,
        } => {
            let result =
                pipeline::run_download(&manifest, output, master_password, &config).await?;
            println!(
                "Recovered {} bytes -> {}",
                result.bytes_written,
                result.output_path.display()
            );
        }

        Commands::Verify { manifest } => {
            let report = pipeline::run_verify(&manifest, &config).await?;
            println!("File: {}", report.file_name);
            for p in &report.partitions {
                println!(
                    "  partition {:>3}: {}/{} fragments reachable",
                    p.index, p.reachable_fragments, p.total_fragments
                );
            }
            println!(
                "{}: {}/{} partitions reachable, {} required",
                if report.recoverable {
                    "RECOVERABLE"
                } else {
                    "NOT RECOVERABLE"
                },
                report.recoverable_partitions,
                report.partitions.len(),
                report.required
            );
        }

        Commands::Info { manifest } => {
            let raw = tokio::fs::read_to_string(&manifest).await?;
            let m = RecoveryManifest::from_json(&raw)?;
            println!("File:       {}", m.file_name);
            println!("Size:       {} bytes", m.original_size);
            println!("SHA-256:    {}", m.file_hash);
            println!("Version:    {}", m.version);
            println!("Compressed: {}", m.compressed);
            match &m.reed_solomon_config {
                Some(cfg) => println!(
                    "Erasure:    {} data + {} parity shards",
                    cfg.data_shards, cfg.parity_shards
                ),
                None => println!("Erasure:    disabled ({} partitions)", m.partitions.len()),
            }
            println!(
                "Security:   {} / {} key derivation, password protected: {}",
                m.security.master_encryption.algorithm,
                m.security.master_encryption.key_derivation,
                m.is_password_protected()
            );
            println!(
                "Fragments:  {} total, unique keys per fragment: {}",
                m.security.fragment_encryption.total_unique_keys,
                m.security.fragment_encryption.unique_keys_per_fragment
            );
            for p in &m.partitions {
                println!("  partition {:>3} ({} bytes):", p.index, p.size);
                for f in &p.fragments {
                    println!(
                        "    replica {} on {} ({}...)",
                        f.redundancy_index,
                        f.node_address,
                        &f.fragment_id[..16.min(f.fragment_id.len())]
                    );
                }
            }
        }

        Commands::Stats => {
            let directory = DirectoryClient::new(config.directory_url.clone(), config.directory_timeout);
            let stats = directory.stats().await?;
            println!("Directory:       {}", config.directory_url);
            println!("Nodes:           {} ({} active)", stats.total_nodes, stats.active_nodes);
            println!("Fragments:       {}", stats.total_fragments);
            println!(
                "Space:           {} / {} bytes free",
                stats.available_space, stats.total_space
            );
        }

        Commands::Config => {
            println!("directory_url:     {}", config.directory_url);
            println!("directory_timeout: {:?}", config.directory_timeout);
            println!("ping_timeout:      {:?}", config.ping_timeout);
            println!("transfer_timeout:  {:?}", config.transfer_timeout);
        }

        Commands::Test => {
            let directory = DirectoryClient::new(config.directory_url.clone(), config.directory_timeout);
            let nodes = directory.discover_nodes(16, 0).await?;
            println!("Directory reachable; {} nodes advertised", nodes.len());

            let client = NodeClient::new(&config);
            let ranked = selection::probe_and_rank(&client, nodes).await;
            for n in &ranked {
                match n.latency {
                    Some(l) => println!(
                        "  {:<38} {:>6} ms  score {:.1}",
                        n.node.location(),
                        l.as_millis(),
                        n.score
                    ),
                    None => println!("  {:<38} unreachable", n.node.location()),
                }
            }
        }

        Commands::Node {
            storage_dir,
            port,
            advertise_address,
            capacity,
        } => {
            let node_config = NodeConfig {
                storage_dir,
                port,
                advertise_address,
                directory_url: cli.server,
                capacity,
                ..NodeConfig::default()
            };
            myst::node::serve(node_config).await?;
        }
    }

    Ok(())
}
