use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use ragbot_chat::{ChatRequest, ChatResponse, ChatService, ConversationHistory, IndexRegistry, OpenAiCompatGenerator};
use ragbot_core::config::{Config, Settings};
use ragbot_core::logging;
use ragbot_core::traits::Embedder;
use ragbot_core::types::DomainId;
use ragbot_embed::{get_default_embedder, get_default_token_counter};

/// Course-assistant chatbot over per-domain vector indexes.
#[derive(Parser, Debug)]
#[command(name = "ragbot", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build (or load) the index of one domain, or of all of them
    Index {
        #[arg(long)]
        domain: Option<String>,
        /// Discard persisted indexes and rebuild from source
        #[arg(long)]
        rebuild: bool,
    },
    /// Show the passages closest to a query
    Search {
        domain: String,
        query: String,
        #[arg(long, default_value_t = ragbot_vector::DEFAULT_TOP_K)]
        limit: usize,
    },
    /// Answer a single question
    Ask { domain: String, question: String },
    /// Interactive conversation; type `exit` to leave
    Chat { domain: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("info");
    let cli = Cli::parse();
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {e:#}");
        e
    })?;
    let settings = config.settings()?;
    let registry = Arc::new(build_registry(&settings)?);

    match cli.command {
        Commands::Index { domain, rebuild } => index(&registry, domain.as_deref(), rebuild).await,
        Commands::Search { domain, query, limit } => search(&registry, &domain, &query, limit).await,
        Commands::Ask { domain, question } => {
            let service = chat_service(&settings, registry)?;
            let request = ChatRequest { question, domain_id: DomainId::new(domain), history: ConversationHistory::new() };
            match service.handle(request).await {
                ChatResponse::Answer { answer, .. } => println!("{answer}"),
                ChatResponse::Error { error } => bail!(error),
            }
            Ok(())
        }
        Commands::Chat { domain } => {
            let domain = match domain {
                Some(d) => d,
                None => choose_domain(&registry)?,
            };
            chat(&chat_service(&settings, Arc::clone(&registry))?, &domain).await
        }
    }
}

fn build_registry(settings: &Settings) -> Result<IndexRegistry> {
    let embedder = get_default_embedder(&settings.embedding)?;
    let counter = get_default_token_counter(&settings.embedding)?;
    Ok(IndexRegistry::new(settings, embedder, counter))
}

fn chat_service(settings: &Settings, registry: Arc<IndexRegistry>) -> Result<ChatService> {
    let generator = OpenAiCompatGenerator::new(&settings.generation)?;
    Ok(ChatService::new(settings, registry, Arc::new(generator)))
}

async fn index(registry: &IndexRegistry, domain: Option<&str>, rebuild: bool) -> Result<()> {
    let ids: Vec<String> = match domain {
        Some(d) => vec![d.to_string()],
        None => registry.domains().map(|(id, _)| id.to_string()).collect(),
    };
    for id in ids {
        let index = if rebuild { registry.rebuild(&id).await? } else { registry.ensure_index(&id).await? };
        info!(domain = %id, documents = index.len(), "index ready");
        println!("domain {id}: {} documents (dim {})", index.len(), index.dimension());
    }
    Ok(())
}

async fn search(registry: &IndexRegistry, domain: &str, query: &str, limit: usize) -> Result<()> {
    let index = registry.ensure_index(domain).await?;
    let query_vector = registry.embedder().embed(query)?;
    let hits = index.search_scored(&query_vector, limit)?;
    println!("Found {} results for: \"{query}\"", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        println!("\n  {}. distance={:.4}", i + 1, hit.distance);
        for (key, value) in &hit.document.metadata {
            println!("     {key}: {value}");
        }
        println!("     {}", hit.document.content);
    }
    Ok(())
}

fn choose_domain(registry: &IndexRegistry) -> Result<String> {
    println!("Escolha o contexto:");
    for (id, domain) in registry.domains() {
        println!("{id}. {}", domain.label);
    }
    print!("Número do contexto: ");
    io::stdout().flush()?;
    let mut choice = String::new();
    io::stdin().lock().read_line(&mut choice)?;
    let choice = choice.trim().to_string();
    if !registry.contains(&choice) {
        bail!("contexto inválido: '{choice}'");
    }
    Ok(choice)
}

async fn chat(service: &ChatService, domain: &str) -> Result<()> {
    println!("Bem-vindo! Para sair, escreva 'exit'.");
    let stdin = io::stdin();
    let mut history = ConversationHistory::new();
    loop {
        print!("\nPergunta: ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).context("reading question")? == 0 {
            break;
        }
        let question = line.trim();
        if question.eq_ignore_ascii_case("exit") {
            break;
        }
        if question.is_empty() {
            println!("Escreva a sua pergunta.");
            continue;
        }
        let request = ChatRequest { question: question.to_string(), domain_id: DomainId::from(domain), history: history.clone() };
        match service.handle(request).await {
            ChatResponse::Answer { answer, history: next } => {
                println!("\nResposta: {answer}");
                history = next;
            }
            ChatResponse::Error { error } => println!("\nErro: {error}"),
        }
    }
    println!("Até breve!");
    Ok(())
}
