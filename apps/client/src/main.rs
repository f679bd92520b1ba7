#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lass_client::run().await
}
