#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = aula_rust::run().await {
        eprintln!("aula-rust fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
