use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    workflow_shell::cli::run().await
}
