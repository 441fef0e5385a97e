//! tile-bridge - map tile acquisition and tile proxy.
//!
//! This binary runs the tile proxy, fetches single tiles and checks source
//! catalogs.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::runtime::Handle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tile_bridge::{
    build_http_client,
    cache::open_tile_store,
    config::{CheckConfig, Cli, Command, FetchConfig, ServeConfig},
    server::{create_router, RouterConfig},
    HttpResolverProtocol, SchemeProtocol, SourceCatalog, SourceRegistry, TileSourceDescriptor,
    TileStore,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Fetch(config) => run_fetch(config).await,
        Command::Check(config) => run_check(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let Some(catalog_path) = config.catalog.as_deref() else {
        error!("Configuration error: no source catalog");
        return ExitCode::FAILURE;
    };

    info!("tile-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Catalog: {}", catalog_path.display());
    info!("  Fetch timeout: {}s", config.fetch_timeout);

    let catalog = match SourceCatalog::load(catalog_path) {
        Ok(catalog) => catalog,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    if catalog.is_empty() {
        warn!("  Catalog defines no usable tile sources");
    }

    let memory_bytes = match config.memory_cache_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let cache = open_tile_store(config.cache_dir.as_deref(), memory_bytes);

    let Some(registry) = open_registry(catalog.into_sources(), cache, config.fetch_timeout()) else {
        return ExitCode::FAILURE;
    };
    let registry = Arc::new(registry);

    let router = create_router(Arc::clone(&registry), build_router_config(&config));
    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/sources", addr);
    if let Some(engine) = registry.engines().next() {
        info!("    curl http://{}/tiles/{}/0/0/0.png", addr, engine.code());
    }
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    let result = axum::serve(listener, router).await;
    registry.close();

    if let Err(e) = result {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_fetch_timeout(config.fetch_timeout())
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

// =============================================================================
// Fetch Command
// =============================================================================

async fn run_fetch(config: FetchConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let catalog = match SourceCatalog::load(&config.catalog) {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cache = open_tile_store(config.cache_dir.as_deref(), None);

    // Only the requested source is opened
    let sources: Vec<_> = catalog
        .into_sources()
        .into_iter()
        .filter(|source| *source.code == *config.source)
        .collect();

    let Some(registry) = open_registry(sources, cache, config.timeout()) else {
        return ExitCode::FAILURE;
    };

    let registry = Arc::new(registry);
    let code = config.source.clone();
    let coordinate = config.coordinate();
    let timeout = config.timeout();

    let result = {
        let registry = Arc::clone(&registry);
        tokio::task::spawn_blocking(move || registry.fetch_tile(&code, coordinate, timeout)).await
    };
    registry.close();

    let tile = match result {
        Ok(Ok(tile)) => tile,
        Ok(Err(e)) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Error: tile worker failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let written = match &config.output {
        Some(path) => std::fs::write(path, &tile.data),
        None => std::io::stdout().lock().write_all(&tile.data),
    };
    if let Err(e) = written {
        eprintln!("Error: failed to write tile: {}", e);
        return ExitCode::FAILURE;
    }

    if let Some(path) = &config.output {
        eprintln!(
            "✓ {} bytes written to {}{}",
            tile.data.len(),
            path.display(),
            if tile.cache_hit { " (cached)" } else { "" }
        );
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    println!("tile-bridge Catalog Check");
    println!("═════════════════════════");
    println!();

    let coordinate = match config.resolve_coordinate() {
        Ok(coordinate) => coordinate,
        Err(e) => {
            println!("✗ Tile: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let catalog = match SourceCatalog::load(&config.catalog) {
        Ok(catalog) => {
            println!("✓ Catalog: {}", config.catalog.display());
            catalog
        }
        Err(e) => {
            println!("✗ Catalog: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let sources: Vec<TileSourceDescriptor> = catalog
        .into_sources()
        .into_iter()
        .filter(|source| config.source.as_deref().map_or(true, |code| *source.code == *code))
        .collect();

    if sources.is_empty() {
        println!("✗ No matching tile sources");
        return ExitCode::FAILURE;
    }

    println!();
    println!("Sources:");
    println!("────────");
    for source in &sources {
        println!(
            "  {:<12} {} (zoom {}-{}, {} thread(s))",
            source.code, source.name, source.zoom_min, source.zoom_max, source.threads
        );
    }

    let Some(registry) = open_registry(sources.clone(), None, tile_bridge::net::DEFAULT_REQUEST_TIMEOUT)
    else {
        return ExitCode::FAILURE;
    };

    println!();
    let mut failed = false;
    for source in &sources {
        if registry.get(&source.code).is_some() {
            println!("✓ {}: resolver open", source.code);
        } else {
            println!("✗ {}: resolver failed to open ({})", source.code, source.uri);
            failed = true;
        }
    }

    if let Some(coordinate) = coordinate {
        println!();
        println!("Resolving tile {}:", coordinate);

        let registry = Arc::new(registry);
        let lookups = {
            let registry = Arc::clone(&registry);
            tokio::task::spawn_blocking(move || {
                registry
                    .engines()
                    .map(|engine| (engine.code().to_string(), engine.resolve_url(&coordinate)))
                    .collect::<Vec<_>>()
            })
            .await
        };
        registry.close();

        match lookups {
            Ok(lookups) => {
                for (code, url) in lookups {
                    match url {
                        Some(url) => println!("  ✓ {}: {}", code, url),
                        None => {
                            println!("  ✗ {}: no URL", code);
                            failed = true;
                        }
                    }
                }
            }
            Err(e) => {
                println!("  ✗ resolver worker failed: {}", e);
                failed = true;
            }
        }
    } else {
        registry.close();
    }

    println!();
    println!("═════════════════════════");
    if failed {
        println!("✗ Some checks failed");
        return ExitCode::FAILURE;
    }
    println!("✓ All checks passed!");

    ExitCode::SUCCESS
}

// =============================================================================
// Shared Setup
// =============================================================================

/// Open every source against a shared HTTP client.
///
/// Returns `None` if the HTTP client could not be built.
fn open_registry(
    sources: Vec<TileSourceDescriptor>,
    cache: Option<Arc<dyn TileStore>>,
    timeout: std::time::Duration,
) -> Option<SourceRegistry> {
    let http = match build_http_client(timeout) {
        Ok(http) => http,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            eprintln!("Error: {}", e);
            return None;
        }
    };

    let runtime = Handle::current();
    let protocol = SchemeProtocol::new(
        HttpResolverProtocol::new(http.clone(), runtime.clone()).with_query_timeout(timeout),
    );

    Some(SourceRegistry::open(
        sources,
        &runtime,
        &http,
        Arc::new(protocol),
        cache,
    ))
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tile_bridge=debug,tower_http=debug"
    } else {
        "tile_bridge=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
