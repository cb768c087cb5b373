#[tokio::main]
async fn main() -> anyhow::Result<()> {
    spark_lib::run().await
}
