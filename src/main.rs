use almoner::{App, ConfigBuilder, webhooks::LogPaymentEvents};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigBuilder::new().from_env().build_unchecked();
    almoner::init_tracing_with_config(&config);

    // Refuses to start without a webhook secret unless explicitly allowed
    config.validate()?;

    tracing::info!(
        csrf = config.csrf.enabled,
        webhook_path = %config.webhook.path,
        "Starting almoner"
    );

    App::with_config(config)
        .with_payment_webhooks(LogPaymentEvents)?
        .serve()
        .await?;

    Ok(())
}
