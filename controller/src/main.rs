mod api;
mod app;
mod net;
mod portal;
mod scan;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::run().await
}
