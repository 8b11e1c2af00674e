// Archipel — Ed25519 node identity generator
//
// Generates one keypair per invocation and persists it as a public/private
// pair of identity records under the output directory.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod identity;

use identity::{persist, select_and_generate};

#[derive(Parser, Debug)]
#[command(
    name = "archipel-keygen",
    version,
    about = "Archipel — Ed25519 node identity generator"
)]
struct Cli {
    /// Node name (e.g. alice, bob, node1)
    #[arg(long, default_value = "node")]
    name: String,

    /// Output directory for the identity files
    #[arg(long, default_value = ".archipel")]
    output: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // init tracing from env ARCHIPEL_LOG or RUST_LOG
    let filter = std::env::var("ARCHIPEL_LOG")
        .unwrap_or_else(|_| std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    println!();
    println!("  Archipel — node identity generation");
    println!();

    info!("Generating Ed25519 keypair...");
    let (material, provider) = select_and_generate();
    info!("Backend used: {provider}");

    let persisted = persist(
        &material.private_bytes,
        &material.public_bytes,
        &cli.output,
        &cli.name,
    )?;

    println!("  Keys generated successfully!");
    println!();
    println!("  Node         : {}", cli.name);
    println!("  Fingerprint  : {}", persisted.fingerprint);
    println!("  Node ID      : {}", &persisted.node_id[..32]);
    println!("                 {}", &persisted.node_id[32..]);
    println!();
    println!("  Public key  -> {}", persisted.public_path.display());
    println!(
        "  Private key -> {}  (owner-only)",
        persisted.private_path.display()
    );
    println!();
    println!("  Never share {}", persisted.private_path.display());
    println!();

    gitignore_advisory(&cli.output);
    Ok(())
}

/// Informational only: warn when ./.gitignore exists but does not cover the
/// directory holding the private key.
fn gitignore_advisory(output_dir: &Path) {
    let gitignore = Path::new(".gitignore");
    if !gitignore.exists() {
        return;
    }
    let Ok(content) = std::fs::read_to_string(gitignore) else {
        return;
    };

    let entry = output_dir.to_string_lossy().replace('\\', "/");
    let entry = entry.trim_end_matches('/');
    let covered = content
        .lines()
        .any(|line| line.trim().trim_end_matches('/') == entry);

    if covered {
        println!("  .gitignore already covers {entry}/");
    } else {
        println!("  ⚠️  {entry}/ is not in your .gitignore!");
        println!("      Add this line: {entry}/");
    }
    println!();
}
