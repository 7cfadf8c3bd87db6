use bedrock_gateway::config::config_search_paths;
use bedrock_gateway::models::ModelMetadataTable;
use bedrock_gateway::providers::ProviderPreset;
use bedrock_gateway::{
    build_router, AppState, BedrockClient, CostCalculator, GatewayConfig, SharedLogger,
    StaticCatalog,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "bedrock-gateway",
    about = "OpenAI-compatible chat completions gateway for Amazon Bedrock",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// AWS region (overrides config)
    #[arg(long)]
    region: Option<String>,

    /// Audit log file path
    #[arg(long, default_value = "bedrock-gateway.log")]
    log_file: PathBuf,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bedrock_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = GatewayConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(region) = cli.region {
        config.backend.region = region;
    }

    let logger = SharedLogger::new(&cli.log_file)?;

    let metadata = ModelMetadataTable::load_or_empty(config.catalog.metadata_path.as_deref())?;
    let costs = CostCalculator::from_metadata(&metadata);
    let catalog = StaticCatalog::new(config.allow_list(), metadata);
    let backend = BedrockClient::from_config(&config)?;

    info!("bedrock-gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("  Region:    {}", config.backend.region);
    info!("  Runtime:   {}", config.runtime_base_url());
    info!("  Auth:      {}", if backend.has_api_key() { "bearer token" } else { "none" });
    info!("  Default:   {}", config.default_model);
    let providers: Vec<String> = catalog
        .allow_list
        .prefixes()
        .iter()
        .map(|prefix| {
            ProviderPreset::for_model(prefix)
                .map_or_else(|| prefix.clone(), |p| p.display_name.to_string())
        })
        .collect();
    info!("  Providers: {}", providers.join(", "));
    info!("  Metadata:  {} models", catalog.metadata.len());
    info!("  Aliases:   {} mapped", config.models.len());
    info!("  Log file:  {}", cli.log_file.display());

    logger.info(
        "startup",
        format!(
            "Starting bedrock-gateway region={} port={}",
            config.backend.region, config.port
        ),
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        backend: Arc::new(backend),
        catalog: Arc::new(catalog),
        costs: Arc::new(costs),
        logger: logger.clone(),
    });

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
