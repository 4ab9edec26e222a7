#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rocket_resequencer::server::run().await
}
