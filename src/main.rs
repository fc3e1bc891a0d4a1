//! mesa-os - Mars weather and facts chat bot
//!
//! Usage:
//!   mesa-os                          → assistant persona (weather + web search)
//!   MESA_PERSONA=weather mesa-os     → weather persona (always consults the weather tool)
//!   MESA_LOG_FILE=mesa.log mesa-os   → also write logs to a file

use clap::Parser;
use mesa_agent::{AgentRuntime, RuntimeConfig};
use mesa_core::MesaConfig;
use mesa_llm::{AnthropicProvider, LlmProvider};
use mesa_os::{personas, ConversationLoop};
use mesa_tools::{assistant_registry, SearchEndpoint, SearchSession, SearchSessionConfig, SessionState, WeatherTool};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "mesa_os=warn,mesa_tools=warn,mesa_agent=warn";
const SEARCH_SESSION_NAME: &str = "Exa Search MCP";
const SEARCH_UNAVAILABLE: &str =
    "NOTE: web search is unavailable for this session - answering from weather data only.";

#[derive(Parser)]
#[command(
    name = "mesa-os",
    about = "MESA-OS - Martian Environmental Systems Authority",
    version = env!("CARGO_PKG_VERSION"),
    long_about = "MESA-OS answers questions about Mars weather and Mars facts.\n\
                  Configuration is read from the environment (and .env):\n\
                  NASA_API_KEY, EXA_API_KEY, ANTHROPIC_API_KEY, MESA_PERSONA,\n\
                  MESA_MODEL, MESA_MAX_TOOL_ITERATIONS, MESA_LOG_FILE."
)]
struct Cli {}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let _cli = Cli::parse();

    // Tracing must be up before from_env logs its warnings.
    let log_file = std::env::var_os("MESA_LOG_FILE")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    let guard = init_tracing(log_file.as_deref());

    let config = MesaConfig::from_env();

    if let Err(e) = run(config).await {
        error!("{:#}", e);
    }

    // Stdin is read on a blocking thread that runtime shutdown would wait on.
    drop(guard);
    std::process::exit(0);
}

fn init_tracing(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    let (file_layer, guard) = match log_file.and_then(open_log_file) {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(filter()),
        )
        .with(file_layer)
        .init();
    guard
}

fn open_log_file(path: &Path) -> Option<RollingFileAppender> {
    let name = path.file_name()?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    match RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.to_string_lossy())
        .build(dir)
    {
        Ok(appender) => Some(appender),
        Err(e) => {
            eprintln!("cannot open log file {}: {}", path.display(), e);
            None
        }
    }
}

async fn run(config: MesaConfig) -> anyhow::Result<()> {
    debug!(
        persona = ?config.persona,
        model = %config.model,
        log_file = ?config.log_file,
        "starting"
    );

    let weather = Arc::new(WeatherTool::new(config.nasa_api_key.clone()).with_endpoint(&config.weather_url));

    let search = Arc::new(SearchSession::new(SearchSessionConfig::new(
        SEARCH_SESSION_NAME,
        SearchEndpoint::new(&config.search_url, config.exa_api_key.clone()),
    ))?);
    let notice = match search.connect().await {
        Ok(()) => None,
        Err(e) => {
            warn!("search session unavailable: {}", e);
            Some(SEARCH_UNAVAILABLE)
        }
    };
    let connected = search.state() == SessionState::Connected;

    let tools = assistant_registry(weather.clone(), connected.then_some(&search)).await;
    let agent = personas::for_persona(config.persona, weather, &tools).with_model(&config.model);
    info!("persona {} with tools {:?}", agent.name(), agent.tools().list());

    let mut provider = match config.anthropic_api_key.clone() {
        Some(key) => AnthropicProvider::new(key),
        None => AnthropicProvider::without_key(),
    };
    if let Some(url) = &config.anthropic_base_url {
        provider = provider.with_base_url(url);
    }
    let provider: Arc<dyn LlmProvider> = Arc::new(provider);

    let runtime = Arc::new(AgentRuntime::new(
        provider,
        RuntimeConfig {
            default_model: config.model.clone(),
            max_tool_iterations: config.max_tool_iterations,
            ..Default::default()
        },
    ));

    let mut conversation = ConversationLoop::new(runtime, agent).with_session(search);
    if let Some(notice) = notice {
        conversation = conversation.with_notice(notice);
    }

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let exit = conversation.run(stdin, &mut stdout, interrupted()).await?;
    debug!(?exit, "conversation ended");
    Ok(())
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
