use financial_analysis_orchestrator::{
    agent::Orchestrator,
    api::start_server,
    context::ContextTracker,
    execution::StepExecutor,
    interpreter::Interpreter,
    planner::Planner,
    providers::{DataProvider, HttpDataProvider, InMemoryAnalysisToolset, InMemoryDataProvider},
    response::ResponseAssembler,
    state::{InMemorySessionStore, PostgresSessionStore, SessionStore},
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("Financial analysis orchestrator - API server");
    info!("Port: {}", api_port);

    // Session storage: Postgres when configured, in-memory otherwise
    let sessions: Arc<dyn SessionStore> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            info!("Using Postgres session store");
            Arc::new(PostgresSessionStore::connect(&database_url).await?)
        }
        Err(_) => {
            info!("Using in-memory session store");
            Arc::new(InMemorySessionStore::new())
        }
    };

    // Data provider: remote when configured, canned datasets otherwise
    let provider: Arc<dyn DataProvider> = match std::env::var("DATA_PROVIDER_URL") {
        Ok(base_url) => {
            info!("Using HTTP data provider at {}", base_url);
            Arc::new(HttpDataProvider::new(base_url))
        }
        Err(_) => {
            info!("Using in-memory data provider");
            Arc::new(InMemoryDataProvider::new())
        }
    };

    // Create components
    let interpreter = Interpreter::new();
    let symbol_hints: Vec<String> = interpreter
        .resolver()
        .known_symbols()
        .map(String::from)
        .collect();
    let executor = StepExecutor::new(provider, Arc::new(InMemoryAnalysisToolset::new()));

    let orchestrator = Arc::new(Orchestrator::new(
        interpreter,
        ContextTracker::new(),
        Planner::new(),
        executor,
        ResponseAssembler::with_symbol_hints(symbol_hints),
        sessions,
    ));

    info!("Orchestrator initialized");

    // Start API server
    start_server(orchestrator, api_port).await?;

    Ok(())
}
