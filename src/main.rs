use anyhow::Result;
use parley::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
