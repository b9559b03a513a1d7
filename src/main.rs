#[tokio::main]
async fn main() -> anyhow::Result<()> {
    docchat_lib::run().await
}
