#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ic2scratch_lib::run().await
}
