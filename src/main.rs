#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bodytrack_lib::run().await
}
