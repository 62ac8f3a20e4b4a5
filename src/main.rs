use market_brief::models::settings::AppSettings;
use market_brief::telemetry::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file = dotenvy::dotenv().ok();
    let settings = AppSettings::from_env();
    init_logging(settings.log_file.as_deref())?;
    if let Some(path) = env_file {
        log::info!("Loaded environment from {}", path.display());
    }
    for notice in &settings.notices {
        log::warn!("{}", notice);
    }

    market_brief::run(settings).await
}
