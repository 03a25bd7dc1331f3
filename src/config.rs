use anyhow::Error;

const DEFAULT_RPC_BASE_URL: &str = "https://eth-mainnet.g.alchemy.com/v2";
const DEFAULT_TOML_PATH: &str = "./pipeline.toml";

pub struct Config {
    pub rpc_url: String,
    pub toml_path: String,
}

impl Config {
    pub fn new() -> Result<Self, Error> {
        // Load environment variables from .env file
        dotenvy::dotenv().ok();

        let api_key = std::env::var("ALCHEMY_KEY")
            .map_err(|_| anyhow::anyhow!("ALCHEMY_KEY env var not found"))?;

        let base_url =
            std::env::var("RPC_BASE_URL").unwrap_or_else(|_| DEFAULT_RPC_BASE_URL.to_string());

        let toml_path =
            std::env::var("PIPELINE_TOML_PATH").unwrap_or_else(|_| DEFAULT_TOML_PATH.to_string());

        let rpc_url = build_rpc_url(&base_url, &api_key);

        // The API key is part of the URL, so only the base is logged.
        tracing::info!(
            "Startup config:\nrpc_base_url: {}\ntoml_path: {}",
            base_url,
            toml_path
        );

        Ok(Config { rpc_url, toml_path })
    }
}

fn build_rpc_url(base_url: &str, api_key: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), api_key)
}
