use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use std::sync::Arc;
use toolrelay_app::{config_path, parse_args, Catalog, Command, EnvCredentials, RunOptions, USAGE};
use toolrelay_core::{CancellationToken, ExecutionEvent, ExecutionResult};
use toolrelay_executor::{ExecuteRequest, ExecutionRuntime, Executor};
use toolrelay_plugins::{register_builtins, PluginRegistry};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match parse_args(&args)? {
        Command::Help => println!("{}", USAGE),
        Command::List => list()?,
        Command::Run(options) => {
            if !run(options).await? {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn load_catalog(registry: &PluginRegistry) -> Result<Catalog> {
    let path = config_path();
    let mut catalog = Catalog::load(&path)?;
    let migrated = catalog.normalize(registry);
    if migrated > 0 {
        info!("Normalized {} tool config(s) from {}", migrated, path.display());
    }
    Ok(catalog)
}

fn builtin_registry() -> Result<PluginRegistry> {
    let registry = PluginRegistry::new();
    register_builtins(&registry).context("Failed to register built-in plugins")?;
    Ok(registry)
}

fn list() -> Result<()> {
    let registry = builtin_registry()?;
    let catalog = load_catalog(&registry)?;
    if catalog.tools.is_empty() {
        println!("No tools configured");
    }
    for tool in &catalog.tools {
        let known = if registry.manifest_by_tool_type(&tool.tool_type).is_some() {
            ""
        } else {
            "  (no adapter)"
        };
        println!("{:<24} {:<10} {}{}", tool.id, tool.tool_type, tool.name, known);
    }
    Ok(())
}

/// Execute one tool. Returns whether the call succeeded.
async fn run(options: RunOptions) -> Result<bool> {
    let registry = builtin_registry()?;
    let catalog = load_catalog(&registry)?;
    let tool = catalog
        .tool(&options.tool_id)
        .cloned()
        .ok_or_else(|| anyhow!("Unknown tool: {}", options.tool_id))?;

    let runtime = Arc::new(ExecutionRuntime::new(catalog.settings.clone()));
    let executor = Executor::new(Arc::new(registry), Arc::new(EnvCredentials), runtime);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling execution");
            on_interrupt.cancel();
        }
    });

    let mut request = ExecuteRequest::new(tool, options.action)
        .with_cancellation(cancel)
        .streaming(options.stream);
    if let Some(payload) = options.payload {
        request = request.with_payload(payload);
    }
    if let Some(timeout_ms) = options.timeout_ms {
        request = request.with_timeout_ms(timeout_ms);
    }

    let result = if options.stream {
        let mut events = executor.execute_stream(request);
        let mut settled: Option<ExecutionResult> = None;
        while let Some(event) = events.next().await {
            match event {
                ExecutionEvent::Result { result } => settled = Some(result),
                progress => println!("{}", serde_json::to_string(&progress)?),
            }
        }
        settled.ok_or_else(|| anyhow!("Execution stream ended without a result"))?
    } else {
        executor.execute(request).await
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.is_ok())
}
