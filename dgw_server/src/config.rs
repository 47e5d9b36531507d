use std::{env, io::Write, path::PathBuf, time::Duration as StdDuration};

use chrono::Duration;
use dgw_common::{helpers::parse_boolean_flag, Secret};
use dgw_engine::{
    order_objects::{ChainConfig, GatewayOptions, DEFAULT_CHAIN_ID},
    providers::DEFAULT_INVOICE_API_URL,
    tokens::{TokenConfig, DEFAULT_TOKEN_MAX_USES, DEFAULT_TOKEN_TTL_SECS},
};
use log::*;
use rand::RngCore;
use tempfile::NamedTempFile;

const DEFAULT_DGW_HOST: &str = "127.0.0.1";
const DEFAULT_DGW_PORT: u16 = 8360;
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_CATALOG_PATH: &str = "catalog.json";
const DEFAULT_PACKAGES_DIR: &str = "packages";
const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
const DEFAULT_HTTP_TIMEOUT: StdDuration = StdDuration::from_secs(20);

#[derive(Clone, Debug)]
pub enum StoreConfig {
    File { data_dir: PathBuf },
    Remote { url: String, token: Secret<String> },
}

#[derive(Clone, Debug)]
pub struct InvoiceConfig {
    /// Use the simulated provider instead of the hosted invoice API
    pub simulated: bool,
    pub api_url: String,
    pub api_key: Secret<String>,
    /// Key for checking payment notifications. Notifications are refused while this is empty.
    pub ipn_secret: Secret<String>,
    pub success_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AdminConfig {
    pub enabled: bool,
    /// Key for the `x-dgw-signature` request signature
    pub secret: Secret<String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// The externally visible URL of this server, used in download links and invoice callbacks
    pub public_url: String,
    pub store: StoreConfig,
    pub catalog_path: PathBuf,
    pub packages_dir: PathBuf,
    pub tokens: TokenConfig,
    pub invoices: InvoiceConfig,
    pub chain: ChainConfig,
    pub rpc_url: String,
    /// Upper bound on every outbound call
    pub http_timeout: StdDuration,
    pub admin: AdminConfig,
    /// If set, pending orders older than this are expired by a background job
    pub pending_order_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DGW_HOST, DEFAULT_DGW_PORT)
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            public_url: format!("http://{host}:{port}"),
            store: StoreConfig::File { data_dir: PathBuf::from(DEFAULT_DATA_DIR) },
            catalog_path: PathBuf::from(DEFAULT_CATALOG_PATH),
            packages_dir: PathBuf::from(DEFAULT_PACKAGES_DIR),
            tokens: TokenConfig::new(random_secret()),
            invoices: InvoiceConfig {
                simulated: true,
                api_url: DEFAULT_INVOICE_API_URL.to_string(),
                api_key: Secret::default(),
                ipn_secret: Secret::default(),
                success_url: None,
            },
            chain: ChainConfig { rpc_endpoint: DEFAULT_RPC_URL.to_string(), ..Default::default() },
            rpc_url: DEFAULT_RPC_URL.to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            admin: AdminConfig { enabled: false, secret: Secret::default() },
            pending_order_timeout: None,
        }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("DGW_HOST").ok().unwrap_or_else(|| DEFAULT_DGW_HOST.into());
        let port = env::var("DGW_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for DGW_PORT. {e} Using the default, {DEFAULT_DGW_PORT}, instead."
                    );
                    DEFAULT_DGW_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_DGW_PORT);
        let public_url = env::var("DGW_PUBLIC_URL")
            .ok()
            .map(|s| s.trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                let url = format!("http://{host}:{port}");
                info!("🪛️ DGW_PUBLIC_URL is not set. Download links will point at {url}");
                url
            });
        let http_timeout = env::var("DGW_HTTP_TIMEOUT")
            .ok()
            .and_then(|s| {
                dgw_common::helpers::parse_duration_secs(&s).or_else(|| {
                    warn!("🪛️ Invalid DGW_HTTP_TIMEOUT ({s}). Using the default.");
                    None
                })
            })
            .unwrap_or(DEFAULT_HTTP_TIMEOUT);
        let store = configure_store();
        let catalog_path = env::var("DGW_CATALOG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
            info!("🪛️ DGW_CATALOG_PATH is not set. Using {DEFAULT_CATALOG_PATH}");
            PathBuf::from(DEFAULT_CATALOG_PATH)
        });
        let packages_dir = env::var("DGW_PACKAGES_DIR").map(PathBuf::from).unwrap_or_else(|_| {
            info!("🪛️ DGW_PACKAGES_DIR is not set. Using {DEFAULT_PACKAGES_DIR}");
            PathBuf::from(DEFAULT_PACKAGES_DIR)
        });
        let tokens = configure_tokens();
        let invoices = InvoiceConfig::from_env();
        let rpc_url = env::var("DGW_RPC_URL").ok().filter(|s| !s.is_empty()).unwrap_or_else(|| {
            warn!("🪛️ DGW_RPC_URL is not set. On-chain payments will be verified against {DEFAULT_RPC_URL}");
            DEFAULT_RPC_URL.to_string()
        });
        let chain = configure_chain(&rpc_url);
        let admin = AdminConfig::from_env();
        let pending_order_timeout = env::var("DGW_PENDING_ORDER_TIMEOUT").ok().and_then(|s| {
            s.parse::<i64>()
                .map(Duration::hours)
                .map_err(|e| warn!("🪛️ Invalid configuration value for DGW_PENDING_ORDER_TIMEOUT. {e}"))
                .ok()
        });
        Self {
            host,
            port,
            public_url,
            store,
            catalog_path,
            packages_dir,
            tokens,
            invoices,
            chain,
            rpc_url,
            http_timeout,
            admin,
            pending_order_timeout,
        }
    }

    /// The subset of the configuration the order flow needs
    pub fn gateway_options(&self) -> GatewayOptions {
        GatewayOptions {
            public_url: self.public_url.clone(),
            chain: self.chain.clone(),
            tokens: self.tokens.clone(),
            admin_enabled: self.admin.enabled,
        }
    }

    pub fn ipn_callback_url(&self) -> String {
        format!("{}/webhook/invoice", self.public_url)
    }
}

fn configure_store() -> StoreConfig {
    match env::var("DGW_STORE").map(|s| s.to_lowercase()).as_deref() {
        Ok("remote") => {
            let url = env::var("DGW_KV_URL").unwrap_or_else(|_| {
                error!("🪛️ DGW_STORE is 'remote' but DGW_KV_URL is not set. Every store call will fail.");
                String::default()
            });
            let token = env::var("DGW_KV_TOKEN").unwrap_or_else(|_| {
                error!("🪛️ DGW_STORE is 'remote' but DGW_KV_TOKEN is not set.");
                String::default()
            });
            StoreConfig::Remote { url, token: Secret::new(token) }
        },
        Ok("file") | Err(_) => {
            let data_dir = env::var("DGW_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string());
            StoreConfig::File { data_dir: PathBuf::from(data_dir) }
        },
        Ok(other) => {
            warn!("🪛️ Unknown DGW_STORE value '{other}'. Using the file store.");
            let data_dir = env::var("DGW_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string());
            StoreConfig::File { data_dir: PathBuf::from(data_dir) }
        },
    }
}

fn configure_tokens() -> TokenConfig {
    let secret = match env::var("DGW_TOKEN_SECRET") {
        Ok(s) if !s.is_empty() => s,
        _ => session_secret(),
    };
    let ttl_secs = env::var("DGW_TOKEN_TTL")
        .ok()
        .and_then(|s| {
            dgw_common::helpers::parse_signed_seconds(&s).or_else(|| {
                warn!("🪛️ Invalid DGW_TOKEN_TTL ({s}). Using {DEFAULT_TOKEN_TTL_SECS}s.");
                None
            })
        })
        .unwrap_or(DEFAULT_TOKEN_TTL_SECS);
    let max_uses = env::var("DGW_TOKEN_MAX_USES")
        .ok()
        .and_then(|s| {
            s.parse::<u32>()
                .map_err(|e| warn!("🪛️ Invalid DGW_TOKEN_MAX_USES ({s}). {e} Using {DEFAULT_TOKEN_MAX_USES}."))
                .ok()
        })
        .unwrap_or(DEFAULT_TOKEN_MAX_USES);
    TokenConfig::new(secret).with_ttl(ttl_secs).with_max_uses(max_uses)
}

fn configure_chain(rpc_url: &str) -> ChainConfig {
    let merchant_address = env::var("DGW_MERCHANT_ADDRESS").ok().filter(|s| !s.trim().is_empty());
    if merchant_address.is_none() {
        warn!("🪛️ DGW_MERCHANT_ADDRESS is not set. On-chain checkout is disabled.");
    }
    let chain_id = env::var("DGW_CHAIN_ID")
        .ok()
        .and_then(|s| s.parse::<u64>().map_err(|e| warn!("🪛️ Invalid DGW_CHAIN_ID ({s}). {e}")).ok())
        .unwrap_or(DEFAULT_CHAIN_ID);
    let usd_cents_per_native = env::var("DGW_USD_CENTS_PER_NATIVE")
        .ok()
        .and_then(|s| s.parse::<u64>().map_err(|e| warn!("🪛️ Invalid DGW_USD_CENTS_PER_NATIVE ({s}). {e}")).ok())
        .filter(|rate| *rate > 0);
    ChainConfig { merchant_address, chain_id, usd_cents_per_native, rpc_endpoint: rpc_url.to_string() }
}

impl InvoiceConfig {
    pub fn from_env() -> Self {
        let api_key = env::var("DGW_INVOICE_API_KEY").unwrap_or_default();
        let simulated = match env::var("DGW_SIMULATED_PROVIDER").ok() {
            Some(flag) => parse_boolean_flag(Some(flag), false),
            None => {
                if api_key.is_empty() {
                    warn!("🪛️ No DGW_INVOICE_API_KEY is set. Using the simulated invoice provider.");
                }
                api_key.is_empty()
            },
        };
        if simulated {
            warn!("🚨️ The simulated invoice provider is active. Every invoice settles as paid. 🚨️");
        }
        let api_url = env::var("DGW_INVOICE_API_URL").unwrap_or_else(|_| DEFAULT_INVOICE_API_URL.to_string());
        let ipn_secret = env::var("DGW_INVOICE_IPN_SECRET").unwrap_or_else(|_| {
            info!("🪛️ DGW_INVOICE_IPN_SECRET is not set. Invoice notifications will be refused.");
            String::default()
        });
        let success_url = env::var("DGW_INVOICE_SUCCESS_URL").ok().filter(|s| !s.is_empty());
        Self { simulated, api_url, api_key: Secret::new(api_key), ipn_secret: Secret::new(ipn_secret), success_url }
    }
}

impl AdminConfig {
    pub fn from_env() -> Self {
        let enabled = parse_boolean_flag(env::var("DGW_ENABLE_ADMIN").ok(), false);
        let secret = env::var("DGW_ADMIN_SECRET").unwrap_or_default();
        if enabled && secret.is_empty() {
            error!("🪛️ DGW_ENABLE_ADMIN is set but DGW_ADMIN_SECRET is empty. The admin routes stay disabled.");
            return Self { enabled: false, secret: Secret::default() };
        }
        if enabled {
            info!("🪛️ Admin routes are enabled");
        }
        Self { enabled, secret: Secret::new(secret) }
    }
}

fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// A random token secret for this session only. It is written to a temporary file so that tokens issued in this
/// session can still be inspected after a restart.
fn session_secret() -> String {
    warn!(
        "🚨️🚨️🚨️ DGW_TOKEN_SECRET has not been set. I'm using a random value for this session. Download tokens will \
         stop working when the server restarts. DO NOT operate on production like this. 🚨️🚨️🚨️"
    );
    let secret = random_secret();
    match NamedTempFile::new().ok().and_then(|f| f.keep().ok()) {
        Some((mut f, p)) => match writeln!(f, "{secret}") {
            Ok(()) => warn!(
                "🚨️🚨️🚨️ The token secret for this session was written to {}. If this is a production instance, \
                 you are doing it wrong! Set DGW_TOKEN_SECRET instead. 🚨️🚨️🚨️",
                p.to_str().unwrap_or("???")
            ),
            Err(e) => warn!("🪛️ Could not write the token secret to the temporary file. {e}"),
        },
        None => warn!("🪛️ Could not create a temporary file to store the token secret."),
    }
    secret
}
