#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lass_backend::run().await
}
