use collection_service::{config::Config, Application};
use service_core::observability::logging::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(
        "info,collection_service=debug",
        std::env::var("COLLECTION_JSON_LOGS")
            .map(|v| v == "true")
            .unwrap_or(false),
    );

    let config = Config::from_env()?;
    let application = Application::build(config).await?;
    application.run_until_stopped().await?;

    Ok(())
}
