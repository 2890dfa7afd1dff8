use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use react_agent::clients::{ClientConfig, LLMClient, create_llm_client};
use react_agent::core::{ReactAgent, Step};
use react_agent::tools::{DuckDuckGoSearch, SerpApiSearch, ToolManager, ToolTrait, default_tools};
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "react-agent")]
#[command(version)]
#[command(about = "ReAct agent that answers questions with web search", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, env = "LLM_MODEL_ID")]
    model: Option<String>,

    #[arg(short, long, global = true, env = "LLM_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(short, long, global = true, env = "LLM_BASE_URL", help = "Base URL for the LLM API")]
    base_url: Option<String>,

    #[arg(long, global = true, env = "LLM_TIMEOUT", default_value_t = 60, help = "Request timeout in seconds")]
    timeout: u64,

    #[arg(short, long, global = true, default_value = "openai")]
    provider: String,

    #[arg(long, global = true, value_enum, default_value_t = SearchBackend::Duckduckgo)]
    search: SearchBackend,

    #[arg(long, global = true, env = "SERPAPI_API_KEY", hide_env_values = true)]
    serpapi_key: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SearchBackend {
    Duckduckgo,
    Serpapi,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Answer a single question")]
    Run {
        #[arg(short, long, help = "Question to answer")]
        question: String,

        #[arg(short = 's', long, help = "Maximum steps")]
        max_steps: Option<usize>,

        #[arg(short, long, default_value_t = 0.0, help = "Sampling temperature")]
        temperature: f32,
    },

    #[command(about = "Interactive mode")]
    Interactive {
        #[arg(short = 's', long, help = "Maximum steps")]
        max_steps: Option<usize>,
    },

    #[command(about = "List the registered tools")]
    Tools,
}

fn build_client(args: &Args) -> Result<Arc<dyn LLMClient>> {
    let model = args
        .model
        .clone()
        .context("Model ID not found. Set LLM_MODEL_ID or use --model.")?;

    let config = ClientConfig::new(model)
        .with_api_key(args.api_key.clone())
        .with_base_url(args.base_url.clone())
        .with_timeout_secs(args.timeout);

    Ok(Arc::from(create_llm_client(&args.provider, config)?))
}

fn build_tools(args: &Args) -> Arc<ToolManager> {
    let search: Box<dyn ToolTrait> = match args.search {
        SearchBackend::Duckduckgo => Box::new(DuckDuckGoSearch::new()),
        SearchBackend::Serpapi => Box::new(SerpApiSearch::new(args.serpapi_key.clone())),
    };
    Arc::new(default_tools(search))
}

fn print_step(index: usize, step: Step) {
    println!("{}", format!("--- Step {} ---", index).bold());
    if let Some(thought) = &step.thought {
        println!("{} {}", "Thought:".cyan(), thought);
    }
    println!("{} {}", "Action:".yellow(), step.action);
    println!("{} {}", "Observation:".green(), step.observation);
}

async fn answer(agent: &mut ReactAgent, question: &str) {
    match agent.run(question).await {
        Some(answer) => println!("\n{} {}", "Final Answer:".green().bold(), answer),
        None => println!("\n{}", "No answer: the process terminated before finishing.".red()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let tools = build_tools(&args);

    match &args.command {
        Commands::Run {
            question,
            max_steps,
            temperature,
        } => {
            let client = build_client(&args)?;
            let mut agent = ReactAgent::new(client, tools, *max_steps)
                .with_temperature(*temperature)
                .with_step_callback(Arc::new(print_step));

            println!("Question: {}\n", question);
            answer(&mut agent, question).await;
        }

        Commands::Interactive { max_steps } => {
            let client = build_client(&args)?;
            let mut agent = ReactAgent::new(client, tools, *max_steps).with_step_callback(Arc::new(print_step));

            println!("Interactive mode started. Type 'exit' or 'quit' to end.");
            println!();

            let mut reader = io::BufReader::new(io::stdin());
            let mut stdout = io::stdout();
            let mut line = String::new();

            loop {
                stdout.write_all(b"> ").await?;
                stdout.flush().await?;

                line.clear();
                if reader.read_line(&mut line).await? == 0 {
                    break;
                }

                let input = line.trim();

                if input.is_empty() {
                    continue;
                }

                if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
                    println!("Goodbye!");
                    break;
                }

                answer(&mut agent, input).await;
                println!();
            }
        }

        Commands::Tools => {
            println!("{}", tools.describe());
        }
    }

    Ok(())
}
