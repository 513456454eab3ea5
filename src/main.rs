use anyhow::Result;
use clap::Parser;
use pdf_manuals::cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!(error = ?e, "pdf-manuals failed");
        return Err(e);
    }
    Ok(())
}
