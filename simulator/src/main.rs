mod host;
mod unit;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
