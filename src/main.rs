//! Binary entry point; all behavior lives in the `orc_cli` library crate.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let exit_code = orc_cli::run(std::env::args_os()).await;
    std::process::exit(exit_code);
}
