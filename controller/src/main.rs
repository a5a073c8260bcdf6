mod host;
mod store;
mod transport;
mod updater;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
