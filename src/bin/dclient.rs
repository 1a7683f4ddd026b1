use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the one-shot client
#[derive(Parser)]
#[command(name = "dclient")]
#[command(about = "Send one command to the document index server")]
struct Cli {
   #[arg(
      trailing_var_arg = true,
      allow_hyphen_values = true,
      help = "Command flag followed by its arguments, e.g. -a <title> <authors> <year> <path>"
   )]
   command: Vec<String>,
}

#[tokio::main]
async fn main() {
   tracing_subscriber::fmt()
      .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
      .init();

   let cli = Cli::parse();
   if let Err(e) = docdex::client::execute(&cli.command).await {
      eprintln!("dclient: {e}");
      std::process::exit(1);
   }
}
