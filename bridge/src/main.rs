#[tokio::main]
async fn main() -> anyhow::Result<()> {
    heatbridge::run().await
}
