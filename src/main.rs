use std::path::{Path, PathBuf};
use std::sync::Arc;

use ai_llm_service::error_handler::env_opt;
use ai_llm_service::telemetry::{SEARCH_TARGETS, env_filter_or, layer};
use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use search_eval::{EvalConfig, EvaluationHarness, IndicatifProgress, load_dataset};
use search_pipeline::{PipelineConfig, SearchOptions, SearchPipeline};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_API_ADDRESS: &str = "0.0.0.0:8080";

#[derive(Parser)]
#[command(name = "shop-search", about = "Hybrid product search with LLM filter extraction")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one query and print the ranked results.
    Query {
        query: String,
        #[arg(short, long)]
        limit: Option<usize>,
        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Evaluate the pipeline against a labeled query set.
    Eval {
        #[arg(short, long, default_value = "data/test_queries.json")]
        file: PathBuf,
        /// Report directory; overrides `EVAL_OUTPUT_DIR`.
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short, long)]
        concurrency: Option<usize>,
    },
    /// Serve the HTTP API.
    Serve {
        /// Overrides `API_ADDRESS`.
        #[arg(short, long)]
        address: Option<String>,
    },
    /// Probe the LLM providers and Qdrant.
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Absent .env is fine; the environment may already be populated.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(env_filter_or("info"))
        .with(layer(SEARCH_TARGETS))
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!(target: "shop_search", "interrupted; cancelling in-flight work");
                cancel.cancel();
            }
        });
    }

    let cfg = PipelineConfig::from_env().context("loading configuration")?;
    let context = vec![
        ("collection".to_string(), cfg.store.collection.clone()),
        ("vocabulary".to_string(), cfg.vocabulary.name.clone()),
        (
            "primary_llm".to_string(),
            format!("{}:{}", cfg.llm.primary.provider, cfg.llm.primary.model),
        ),
        (
            "embedding".to_string(),
            format!("{}:{}", cfg.llm.embedding.provider, cfg.llm.embedding.model),
        ),
    ];
    let pipeline = Arc::new(SearchPipeline::connect(cfg).context("building pipeline")?);

    if let Command::Health = cli.command {
        return health(&pipeline).await;
    }

    pipeline
        .check_startup(&cancel)
        .await
        .context("startup check failed")?;

    match cli.command {
        Command::Query { query, limit, json } => run_query(&pipeline, &query, limit, json, cancel).await,
        Command::Eval {
            file,
            output,
            concurrency,
        } => {
            let mut eval_cfg = EvalConfig::from_env()?;
            if let Some(dir) = output {
                eval_cfg.output_dir = dir;
            }
            if let Some(n) = concurrency {
                eval_cfg.concurrency = n;
            }
            eval_cfg.validate()?;
            run_eval(pipeline, &file, eval_cfg, context, &cancel).await
        }
        Command::Serve { address } => {
            let address = address
                .or_else(|| env_opt("API_ADDRESS"))
                .unwrap_or_else(|| DEFAULT_API_ADDRESS.to_string());
            api::start(pipeline, &address, cancel).await?;
            Ok(())
        }
        Command::Health => Ok(()),
    }
}

async fn health(pipeline: &SearchPipeline) -> anyhow::Result<()> {
    let report = pipeline.health().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.ok {
        bail!("one or more upstreams are unhealthy");
    }
    Ok(())
}

async fn run_query(
    pipeline: &SearchPipeline,
    query: &str,
    limit: Option<usize>,
    json: bool,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let options = SearchOptions {
        limit,
        raw_filter: None,
        cancel,
    };
    let resp = match pipeline.execute(query, options).await {
        Ok(r) => r,
        Err(e) if e.is_fatal_config() => return Err(e.into()),
        Err(e) => {
            error!(target: "shop_search", error = %e, "query failed");
            return Ok(());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&resp)?);
        return Ok(());
    }

    println!("semantic query: {}", resp.schema.semantic_query);
    println!("filters: {}", serde_json::to_string(&resp.schema)?);
    if resp.extraction.degraded {
        println!("(extraction unavailable, pure vector search)");
    }
    if resp.items.is_empty() {
        println!("no matches");
    }
    for item in &resp.items {
        let price = item
            .price
            .map(|p| format!(" {p:.2} {}", item.currency.as_deref().unwrap_or("")))
            .unwrap_or_default();
        println!("{:>3}. [{:.3}] {} ({}){price}", item.rank, item.score, item.name, item.id);
        for (k, v) in &item.matched_attributes {
            println!("       {k}: {v}");
        }
    }
    Ok(())
}

async fn run_eval(
    pipeline: Arc<SearchPipeline>,
    file: &Path,
    cfg: EvalConfig,
    context: Vec<(String, String)>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let queries = load_dataset(file)?;
    info!(target: "shop_search", file = %file.display(), queries = queries.len(), "dataset loaded");

    let output_dir = cfg.output_dir.clone();
    let progress = IndicatifProgress::bar(queries.len() as u64);
    let harness = context
        .into_iter()
        .fold(EvaluationHarness::new(pipeline, cfg), |h, (k, v)| h.with_context(k, v))
        .with_context("dataset", file.display().to_string());

    let report = harness.evaluate(queries, &progress, cancel).await;
    let path = report.persist(&output_dir)?;

    println!("queries: {} (failed: {})", report.total_queries, report.failed);
    for (name, value) in &report.global_metrics {
        println!("  {name:<14} {value:.4}");
    }
    for (query_type, summary) in &report.metrics_by_type {
        let mrr = summary.metrics.get("mrr").copied().unwrap_or(0.0);
        println!("  [{query_type}] n={} mrr={mrr:.4}", summary.queries);
    }
    println!("report: {}", path.display());
    Ok(())
}
