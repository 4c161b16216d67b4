use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (notification broker)
    pub redis_url: String,

    /// Identity of this running instance; names its durable queue
    pub instance_id: String,

    /// All instance identities the publisher fans routing messages out to.
    /// Defaults to just this instance for single-node deployments.
    pub instance_peers: Vec<String>,

    /// Port the API server binds to (default: 3000)
    pub api_port: u16,

    /// JWT secret for API authentication
    pub jwt_secret: String,

    /// JWT token expiry in hours
    pub jwt_expiry_hours: u64,

    /// Number of concurrent dispatcher workers per instance (default: 4)
    pub dispatcher_workers: u32,

    /// How long a dispatcher blocks waiting for new routing messages, in
    /// milliseconds (default: 5000)
    pub dispatcher_block_ms: u64,

    /// Upper bound on a single push-channel write in milliseconds; expiry is
    /// treated as a dead connection (default: 5000)
    pub send_timeout_ms: u64,

    /// SSE keep-alive comment interval in seconds (default: 15)
    pub sse_heartbeat_secs: u64,

    /// Maximum lifetime of one SSE connection in seconds; clients reconnect
    /// after expiry (default: 3600)
    pub sse_connection_ttl_secs: u64,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let instance_id = std::env::var("INSTANCE_ID")
            .map_err(|_| anyhow::anyhow!("INSTANCE_ID environment variable is required"))?;

        let instance_peers = match std::env::var("INSTANCE_PEERS") {
            Ok(raw) => parse_peers(&raw),
            Err(_) => vec![instance_id.clone()],
        };
        if instance_peers.is_empty() {
            anyhow::bail!("INSTANCE_PEERS must name at least one instance");
        }

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            instance_id,
            instance_peers,
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("API_PORT must be a valid u16"))?,
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?,
            jwt_expiry_hours: std::env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("JWT_EXPIRY_HOURS must be a valid u64"))?,
            dispatcher_workers: std::env::var("DISPATCHER_WORKERS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DISPATCHER_WORKERS must be a valid u32"))?,
            dispatcher_block_ms: std::env::var("DISPATCHER_BLOCK_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DISPATCHER_BLOCK_MS must be a valid u64"))?,
            send_timeout_ms: std::env::var("SEND_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SEND_TIMEOUT_MS must be a valid u64"))?,
            sse_heartbeat_secs: std::env::var("SSE_HEARTBEAT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SSE_HEARTBEAT_SECS must be a valid u64"))?,
            sse_connection_ttl_secs: std::env::var("SSE_CONNECTION_TTL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SSE_CONNECTION_TTL_SECS must be a valid u64"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
        })
    }
}

/// Split a comma-separated peer list, dropping empty segments.
fn parse_peers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_peers() {
        assert_eq!(parse_peers("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(parse_peers(" node-1 , node-2 "), vec!["node-1", "node-2"]);
        assert_eq!(parse_peers("solo"), vec!["solo"]);
        assert!(parse_peers("").is_empty());
        assert_eq!(parse_peers("a,,b"), vec!["a", "b"]);
    }
}
