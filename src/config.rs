//! Configuration management for tile-bridge.
//!
//! Configuration comes from command-line arguments via clap, with
//! environment variable fallbacks under the `TILES_` prefix and defaults for
//! every optional setting.
//!
//! # Commands
//!
//! - `serve` (default): run the HTTP tile proxy
//! - `fetch`: fetch one tile and write it to a file or stdout
//! - `check`: validate the source catalog and optionally resolve a tile
//!
//! # Environment Variables
//!
//! - `TILES_HOST` - Server bind address (default: 0.0.0.0)
//! - `TILES_PORT` - Server port (default: 3000)
//! - `TILES_CATALOG` - Path of the source catalog JSON file
//! - `TILES_CACHE_DIR` - Application cache directory for downloaded tiles
//! - `TILES_MEMORY_CACHE` - In-memory tile cache size, e.g. `64MB`
//! - `TILES_FETCH_TIMEOUT` - Seconds to wait for a tile (default: 30)
//! - `TILES_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 86400)
//! - `TILES_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::tile::TileCoordinate;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default seconds to wait for a tile.
pub const DEFAULT_FETCH_TIMEOUT: u64 = 30;

/// Default HTTP cache max-age in seconds (1 day).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 86_400;

/// Upper bound on the fetch timeout (10 minutes).
const MAX_FETCH_TIMEOUT: u64 = 600;

// =============================================================================
// CLI Arguments
// =============================================================================

/// tile-bridge - Asynchronous online map tile fetching.
///
/// Resolves tile URLs through pluggable resolver providers, downloads tiles
/// over a bounded HTTP queue and caches them on disk.
#[derive(Parser, Debug, Clone)]
#[command(name = "tile-bridge")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Arguments for the default `serve` command
    #[command(flatten)]
    pub serve: ServeConfig,
}

impl Cli {
    /// The command to run. Without a subcommand, `serve` runs.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Serve(self.serve))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP tile proxy
    Serve(ServeConfig),

    /// Fetch one tile through the bridge
    #[command(allow_negative_numbers = true)]
    Fetch(FetchConfig),

    /// Validate the source catalog
    Check(CheckConfig),
}

// =============================================================================
// Serve
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "TILES_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "TILES_PORT")]
    pub port: u16,

    // =========================================================================
    // Sources
    // =========================================================================
    /// Source catalog JSON file.
    #[arg(long, env = "TILES_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Seconds to wait for a tile before giving up.
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT, env = "TILES_FETCH_TIMEOUT")]
    pub fetch_timeout: u64,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Application cache directory. Tiles are stored under its `online`
    /// subdirectory.
    #[arg(long, env = "TILES_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Size of the in-memory tile cache (e.g. "64MB"). Disabled if unset.
    #[arg(long, env = "TILES_MEMORY_CACHE")]
    pub memory_cache: Option<String>,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "TILES_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "TILES_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.catalog.is_none() {
            return Err("No source catalog given. Set --catalog or TILES_CATALOG".to_string());
        }

        validate_timeout(self.fetch_timeout)?;

        if let Some(size) = &self.memory_cache {
            if parse_size(size)? == 0 {
                return Err("memory_cache must be greater than 0".to_string());
            }
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }

    /// In-memory cache capacity in bytes, if enabled.
    pub fn memory_cache_bytes(&self) -> Result<Option<usize>, String> {
        self.memory_cache.as_deref().map(parse_size).transpose()
    }
}

// =============================================================================
// Fetch
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct FetchConfig {
    /// Code of the tile source
    pub source: String,

    /// Zoom level
    pub zoom: i32,

    /// Tile column
    pub x: i32,

    /// Tile row
    pub y: i32,

    /// Source catalog JSON file.
    #[arg(long, env = "TILES_CATALOG")]
    pub catalog: PathBuf,

    /// Write the tile to this file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Application cache directory.
    #[arg(long, env = "TILES_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Seconds to wait for the tile.
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT, env = "TILES_FETCH_TIMEOUT")]
    pub timeout: u64,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl FetchConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_timeout(self.timeout)?;
        self.coordinate()
            .validate()
            .map_err(|e| e.to_string())
    }

    pub fn coordinate(&self) -> TileCoordinate {
        TileCoordinate::new(self.zoom, self.x, self.y)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

// =============================================================================
// Check
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    /// Source catalog JSON file.
    #[arg(long, env = "TILES_CATALOG")]
    pub catalog: PathBuf,

    /// Resolve the URL of this tile ("z/x/y") for every source.
    #[arg(long)]
    pub resolve: Option<String>,

    /// Only check the source with this code.
    #[arg(long)]
    pub source: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl CheckConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.resolve_coordinate().map(|_| ())
    }

    /// Tile given with `--resolve`, if any.
    pub fn resolve_coordinate(&self) -> Result<Option<TileCoordinate>, String> {
        self.resolve.as_deref().map(parse_tile).transpose()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn validate_timeout(seconds: u64) -> Result<(), String> {
    if seconds == 0 || seconds > MAX_FETCH_TIMEOUT {
        return Err(format!(
            "fetch timeout must be between 1 and {} seconds",
            MAX_FETCH_TIMEOUT
        ));
    }
    Ok(())
}

/// Parse a tile written as "z/x/y".
pub fn parse_tile(text: &str) -> Result<TileCoordinate, String> {
    let parts: Vec<&str> = text.trim().split('/').collect();
    let [z, x, y] = parts.as_slice() else {
        return Err(format!("tile '{}' must be written as z/x/y", text));
    };

    let number = |part: &str| {
        part.parse::<i32>()
            .map_err(|_| format!("tile '{}' must be written as z/x/y", text))
    };
    let coordinate = TileCoordinate::new(number(z)?, number(x)?, number(y)?);
    coordinate.validate().map_err(|e| e.to_string())?;
    Ok(coordinate)
}

/// Parse a byte size such as "512KB", "64MB" or "1GB". Bare numbers are
/// bytes.
pub fn parse_size(text: &str) -> Result<usize, String> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);

    let value: usize = digits
        .parse()
        .map_err(|_| format!("invalid size '{}'", text))?;

    let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" => 1024,
        "M" | "MB" => 1024 * 1024,
        "G" | "GB" => 1024 * 1024 * 1024,
        other => return Err(format!("unknown size unit '{}'", other)),
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size '{}' is too large", text))
}

// =============================================================================
// Tests
// =============================================================================
