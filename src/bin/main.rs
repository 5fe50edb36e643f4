use financial_analysis_orchestrator::{
    agent::Orchestrator,
    context::ContextTracker,
    execution::StepExecutor,
    interpreter::Interpreter,
    planner::Planner,
    providers::{InMemoryAnalysisToolset, InMemoryDataProvider},
    response::ResponseAssembler,
    state::InMemorySessionStore,
};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    info!("Financial analysis orchestrator starting");

    // Create components
    let interpreter = Interpreter::new();
    let symbol_hints: Vec<String> = interpreter
        .resolver()
        .known_symbols()
        .map(String::from)
        .collect();
    let executor = StepExecutor::new(
        Arc::new(InMemoryDataProvider::new()),
        Arc::new(InMemoryAnalysisToolset::new()),
    );

    let orchestrator = Orchestrator::new(
        interpreter,
        ContextTracker::new(),
        Planner::new(),
        executor,
        ResponseAssembler::with_symbol_hints(symbol_hints),
        Arc::new(InMemorySessionStore::new()),
    );

    let session_id = orchestrator.start_session(None).await?;

    println!("{}\n", orchestrator.assembler().welcome());
    println!("(type 'exit' to quit, 'reset' to start over)\n");

    let stdin = io::stdin();
    loop {
        print!("you> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();

        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }
        if input.eq_ignore_ascii_case("reset") {
            orchestrator.reset_session(&session_id).await?;
            println!("\nContext cleared.\n");
            continue;
        }

        match orchestrator.submit(&session_id, input).await {
            Ok(outcome) => {
                println!("\n{}\n", outcome.response_text);
            }
            Err(e) => {
                eprintln!("\nRequest failed: {}\n", e);
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}
