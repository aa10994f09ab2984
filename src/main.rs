use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    mindspace_cli::cli::run().await
}
