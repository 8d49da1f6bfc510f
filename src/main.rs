#[tokio::main]
async fn main() -> anyhow::Result<()> {
    weblead_lib::run().await
}
