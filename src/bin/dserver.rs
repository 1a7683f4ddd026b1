use std::path::PathBuf;

use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the index server
#[derive(Parser)]
#[command(name = "dserver")]
#[command(about = "Document index server over named pipes")]
struct Cli {
   #[arg(help = "Directory holding the document body files")]
   document_folder: PathBuf,

   #[arg(help = "Search responses kept in the LRU cache (0 disables caching)")]
   cache_size: usize,
}

#[tokio::main]
async fn main() -> docdex::Result<()> {
   tracing_subscriber::fmt()
      .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
      .init();

   let cli = Cli::parse();
   docdex::server::execute(cli.document_folder, cli.cache_size).await
}
