use std::sync::Once;

use anyhow::Context;
use articles_api::{config::ApiConfig, startup::Application};
use articles_config::load_config;
use articles_telemetry::tracing::init_tracing;
use tracing::info;

/// Ensures crypto provider is only initialized once.
static INIT_CRYPTO: Once = Once::new();

/// Installs the AWS LC provider as the process-wide rustls default.
///
/// Both `ring` and `aws-lc-rs` end up enabled through feature unification, so the provider
/// must be chosen explicitly before the first TLS connection.
fn install_crypto_provider() {
    INIT_CRYPTO.call_once(|| {
        rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .expect("failed to install default crypto provider");
    });
}

/// Entry point for the article sync API.
fn main() -> anyhow::Result<()> {
    install_crypto_provider();

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"))?;

    actix_web::rt::System::new().block_on(async_main())?;

    Ok(())
}

async fn async_main() -> anyhow::Result<()> {
    let config = load_config::<ApiConfig>().context("loading API configuration")?;
    config
        .validate()
        .context("validating API configuration")?;

    info!(
        project_id = %config.destination.project_id,
        dataset_id = %config.destination.dataset_id,
        table_id = %config.destination.table_id,
        bucket = %config.source.bucket_name,
        "starting article sync api"
    );

    let application = Application::build(config).await?;
    info!(port = application.port(), "listening");
    application.run_until_stopped().await?;

    Ok(())
}
