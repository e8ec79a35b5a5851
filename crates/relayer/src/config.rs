use payment_core::models::ChainConfig;

/// Default polling cadence and request timeout (spec §4.4/§5 defaults, mirrored onto
/// each `PollingTask` at creation time).
pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 10;
pub const DEFAULT_WITHDRAW_TIMEOUT_SECONDS: i64 = 3600;
pub const DEFAULT_PROOF_WORKER_COUNT: usize = 6;

#[derive(Clone)]
pub struct RelayerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,

    pub admin_username: String,
    /// Raw admin password read from the environment once at startup and immediately
    /// hashed with argon2 — never stored or logged in plaintext past `from_env`.
    pub admin_password: String,
    pub admin_totp_secret: String,
    pub admin_jwt_secret: String,
    pub user_jwt_secret: String,
    pub jwt_ttl_seconds: i64,

    pub zkvm_base_url: String,
    pub scanner_url: String,

    pub chains: Vec<ChainConfig>,

    pub poll_interval_seconds: u64,
    pub withdraw_timeout_seconds: i64,
    pub proof_worker_count: usize,
}

impl RelayerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let admin_username =
            std::env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string());
        let admin_password = std::env::var("ADMIN_PASSWORD")
            .map_err(|_| anyhow::anyhow!("ADMIN_PASSWORD must be set"))?;
        let admin_totp_secret = std::env::var("ADMIN_TOTP_SECRET")
            .map_err(|_| anyhow::anyhow!("ADMIN_TOTP_SECRET must be set"))?;
        let admin_jwt_secret = std::env::var("ADMIN_JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("ADMIN_JWT_SECRET must be set"))?;
        let user_jwt_secret = std::env::var("USER_JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("USER_JWT_SECRET must be set"))?;
        let jwt_ttl_seconds = std::env::var("JWT_TTL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3600);

        let zkvm_base_url = std::env::var("ZKVM_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:9000".to_string());
        let scanner_url = std::env::var("SCANNER_URL")
            .unwrap_or_else(|_| "http://localhost:9100".to_string());

        let chain_config_path =
            std::env::var("CHAIN_CONFIG_PATH").unwrap_or_else(|_| "chains.json".to_string());
        let chains = load_chains(&chain_config_path)?;

        let poll_interval_seconds = std::env::var("POLL_INTERVAL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECONDS);
        let withdraw_timeout_seconds = std::env::var("WITHDRAW_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_WITHDRAW_TIMEOUT_SECONDS);
        let proof_worker_count = std::env::var("PROOF_WORKER_COUNT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PROOF_WORKER_COUNT);

        Ok(Self {
            host,
            port,
            database_url,
            admin_username,
            admin_password,
            admin_totp_secret,
            admin_jwt_secret,
            user_jwt_secret,
            jwt_ttl_seconds,
            zkvm_base_url,
            scanner_url,
            chains,
            poll_interval_seconds,
            withdraw_timeout_seconds,
            proof_worker_count,
        })
    }

    pub fn chain(&self, chain_id: u32) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.slip44_id == chain_id)
    }
}

/// Chain configuration has no admin CRUD in scope (spec §1 Non-goals) — it is
/// provisioned from a JSON file read once at startup; adding a chain means editing the
/// file and restarting.
fn load_chains(path: &str) -> anyhow::Result<Vec<ChainConfig>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let chains: Vec<ChainConfig> = serde_json::from_str(&contents)
                .map_err(|e| anyhow::anyhow!("failed to parse {path}: {e}"))?;
            Ok(chains)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(
                path,
                "chain config file not found, starting with no configured chains"
            );
            Ok(Vec::new())
        }
        Err(e) => Err(anyhow::anyhow!("failed to read {path}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_chains_file_yields_empty_list() {
        let chains = load_chains("/nonexistent/path/chains.json").unwrap();
        assert!(chains.is_empty());
    }
}
