use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use supplier_bot::channels::{MessageSender, WhatsAppClient};
use supplier_bot::config::BotConfig;
use supplier_bot::conversation::ConversationStore;
use supplier_bot::dedup::MessageDeduplicator;
use supplier_bot::formatter::ResponseFormatter;
use supplier_bot::intent::IntentExtractor;
use supplier_bot::llm::create_provider;
use supplier_bot::pipeline::MessagePipeline;
use supplier_bot::pricing::{HttpPricingApi, JsonFileLedgerStore, PriceLedger, PricingGateway};
use supplier_bot::server::{AppState, app_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let config = BotConfig::from_env().context("Failed to load configuration")?;

    // Held until exit so buffered file logs are flushed.
    let _log_guard = init_tracing(&config);

    eprintln!("📦 Supplier Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Webhook: http://0.0.0.0:{}/webhook", config.port);
    eprintln!("   Pricing API: {}", config.pricing.update_url);
    eprintln!("   Ledger: {}", config.ledger_path.display());

    // ── LLM ──────────────────────────────────────────────────────────────
    let llm = create_provider(&config.llm).context("Failed to create LLM provider")?;

    // ── Pricing ──────────────────────────────────────────────────────────
    let ledger = Arc::new(
        PriceLedger::load(Box::new(JsonFileLedgerStore::new(&config.ledger_path))).await,
    );
    let pricing_api = Arc::new(
        HttpPricingApi::new(&config.pricing).context("Failed to create pricing client")?,
    );
    let gateway = Arc::new(PricingGateway::new(pricing_api, ledger));

    // ── Pipeline ─────────────────────────────────────────────────────────
    let pipeline = Arc::new(MessagePipeline::new(
        Arc::new(MessageDeduplicator::with_retention(config.dedup_retention)),
        Arc::new(ConversationStore::new()),
        IntentExtractor::new(Arc::clone(&llm)),
        gateway,
        ResponseFormatter::new(llm),
    ));

    // ── WhatsApp ─────────────────────────────────────────────────────────
    let sender: Arc<dyn MessageSender> = Arc::new(
        WhatsAppClient::new(&config.whatsapp).context("Failed to create WhatsApp client")?,
    );

    let app = app_router(AppState {
        pipeline,
        sender,
        verify_token: config.whatsapp.verify_token.clone(),
    });

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(addr = %addr, "Supplier bot listening");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

/// Console logging, plus a daily rolling file when `log_dir` is set.
fn init_tracing(config: &BotConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer().with_target(false);

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "supplier-bot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(file)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .init();
            None
        }
    }
}
