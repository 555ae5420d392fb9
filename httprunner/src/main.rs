#[tokio::main]
async fn main() -> eyre::Result<()> {
    let code = httprunner::App::new().run().await?;
    std::process::exit(code)
}
