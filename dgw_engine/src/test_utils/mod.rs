//! Fixtures for exercising the gateway without a network: a scriptable invoice provider, an in-memory chain and a
//! temporary data directory with a small catalog.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
        Mutex,
    },
};

use dgw_common::{FiatAmount, Wei};
use log::*;
use tempfile::TempDir;
use tokio::sync::mpsc;

use crate::{
    catalog::FileCatalog,
    db_types::ProviderKind,
    events::{EventProducer, EventProducers, OrderAnnulledEvent, OrderPaidEvent},
    gateway_api::{
        order_flow_api::OrderFlowApi,
        order_objects::{ChainConfig, GatewayOptions},
    },
    providers::SimulatedProvider,
    store::FileStore,
    tokens::TokenConfig,
    traits::{
        ChainReceipt,
        ChainRpc,
        ChainTransaction,
        GatewayStack,
        Invoice,
        InvoiceProvider,
        InvoiceRequest,
        Product,
        ProviderError,
        RpcError,
    },
};

pub const MERCHANT: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
pub const BUYER: &str = "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359";
pub const TEST_SECRET: &str = "correct horse battery staple";
/// 250.00 USD per coin
pub const TEST_RATE: u64 = 25_000;
/// 29.00 USD at [`TEST_RATE`]
pub const TEST_PRICE_WEI: u64 = 116_000_000_000_000_000;
pub const FIXTURE_CHAIN_ENDPOINT: &str = "http://fixture.chain";

pub fn prepare_test_env() {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
}

//--------------------------------------        Chain          ---------------------------------------------------------

type TxTable = HashMap<String, (ChainTransaction, Option<ChainReceipt>)>;

/// An in-memory chain. Clones share their transactions.
#[derive(Clone)]
pub struct FixtureChain {
    chain_id: u64,
    txs: Arc<Mutex<TxTable>>,
    offline: Arc<AtomicBool>,
}

impl FixtureChain {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id, txs: Arc::new(Mutex::new(HashMap::new())), offline: Arc::new(AtomicBool::new(false)) }
    }

    /// Adds a successful native transfer
    pub fn add_transfer(&self, hash: &str, from: &str, to: &str, value: Wei) {
        let tx = ChainTransaction {
            hash: hash.to_string(),
            from: Some(from.to_string()),
            to: Some(to.to_string()),
            value: Some(format!("0x{:x}", value.value())),
            chain_id: Some(format!("0x{:x}", self.chain_id)),
            block_number: Some("0x10".into()),
        };
        let receipt = ChainReceipt {
            transaction_hash: Some(hash.to_string()),
            status: Some("0x1".into()),
            block_number: Some("0x10".into()),
        };
        self.add_transaction(tx, Some(receipt));
    }

    /// Adds or replaces a transaction
    pub fn add_transaction(&self, tx: ChainTransaction, receipt: Option<ChainReceipt>) {
        let key = tx.hash.to_lowercase();
        self.txs.lock().expect("fixture chain lock").insert(key, (tx, receipt));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn lookup(&self, tx_hash: &str) -> Result<Option<(ChainTransaction, Option<ChainReceipt>)>, RpcError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RpcError::Transport("the fixture chain is offline".into()));
        }
        Ok(self.txs.lock().expect("fixture chain lock").get(&tx_hash.to_lowercase()).cloned())
    }
}

impl ChainRpc for FixtureChain {
    fn endpoint(&self) -> &str {
        FIXTURE_CHAIN_ENDPOINT
    }

    async fn get_transaction(&self, tx_hash: &str) -> Result<Option<ChainTransaction>, RpcError> {
        Ok(self.lookup(tx_hash)?.map(|(tx, _)| tx))
    }

    async fn get_receipt(&self, tx_hash: &str) -> Result<Option<ChainReceipt>, RpcError> {
        Ok(self.lookup(tx_hash)?.and_then(|(_, receipt)| receipt))
    }
}

//--------------------------------------     Invoice provider    -------------------------------------------------------

/// The simulated provider, with a status that tests can dictate and an off switch.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    inner: SimulatedProvider,
    status: Arc<Mutex<Option<String>>>,
    offline: Arc<AtomicBool>,
}

impl ScriptedProvider {
    /// Every invoice reports this status from now on. `None` restores the simulated behaviour.
    pub fn set_status(&self, status: Option<&str>) {
        *self.status.lock().expect("provider lock") = status.map(String::from);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), ProviderError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(ProviderError::Transport("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

impl InvoiceProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Simulated
    }

    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, ProviderError> {
        self.check_online()?;
        self.inner.create_invoice(request).await
    }

    async fn get_status(&self, payment_id: &str) -> Result<String, ProviderError> {
        self.check_online()?;
        let scripted = self.status.lock().expect("provider lock").clone();
        match scripted {
            Some(status) => Ok(status),
            None => self.inner.get_status(payment_id).await,
        }
    }
}

//--------------------------------------        Gateway          -------------------------------------------------------

#[derive(Clone)]
pub struct TestStack;

impl GatewayStack for TestStack {
    type Catalog = FileCatalog;
    type Chain = FixtureChain;
    type Provider = ScriptedProvider;
    type Store = FileStore;
}

pub fn test_product(product_id: &str, package: &str) -> Product {
    Product {
        product_id: product_id.into(),
        title: format!("Test product {product_id}"),
        price: FiatAmount::from_major(29),
        currency: "usd".into(),
        package: package.into(),
        price_wei: None,
    }
}

/// A catalog of `prod-1` and `prod-2` (29.00 USD each), `prod-3` (priced in wei) and `prod-nopkg`, whose package is
/// missing. Package files are written to `dir/packages`.
pub async fn test_catalog(dir: &TempDir) -> FileCatalog {
    let packages = dir.path().join("packages");
    tokio::fs::create_dir_all(&packages).await.expect("Error creating the packages directory");
    for name in ["prod-1.zip", "prod-2.zip", "prod-3.zip"] {
        tokio::fs::write(packages.join(name), format!("PK contents of {name}")).await.expect("Error writing package");
    }
    let mut prod_3 = test_product("prod-3", "prod-3.zip");
    prod_3.price_wei = Some(Wei::from(1_000_000_000_000_000u64));
    let products = vec![
        test_product("prod-1", "prod-1.zip"),
        test_product("prod-2", "prod-2.zip"),
        prod_3,
        test_product("prod-nopkg", "missing.zip"),
    ];
    FileCatalog::from_products(products, packages)
}

pub fn test_options() -> GatewayOptions {
    let chain = ChainConfig {
        merchant_address: Some(MERCHANT.into()),
        chain_id: 1,
        usd_cents_per_native: Some(TEST_RATE),
        rpc_endpoint: FIXTURE_CHAIN_ENDPOINT.into(),
    };
    let tokens = TokenConfig::new(TEST_SECRET).with_ttl(600).with_max_uses(1);
    GatewayOptions { public_url: "http://localhost:8360".into(), chain, tokens, admin_enabled: true }
}

/// A gateway over a fresh temporary directory, with handles on all of its backends and its events.
pub struct TestGateway {
    pub dir: TempDir,
    pub api: OrderFlowApi<TestStack>,
    pub store: FileStore,
    pub provider: ScriptedProvider,
    pub chain: FixtureChain,
    pub catalog: FileCatalog,
    paid: mpsc::Receiver<OrderPaidEvent>,
    annulled: mpsc::Receiver<OrderAnnulledEvent>,
}

impl TestGateway {
    /// Drains the order paid events published so far
    pub fn paid_events(&mut self) -> Vec<OrderPaidEvent> {
        std::iter::from_fn(|| self.paid.try_recv().ok()).collect()
    }

    /// Drains the order annulled events published so far
    pub fn annulled_events(&mut self) -> Vec<OrderAnnulledEvent> {
        std::iter::from_fn(|| self.annulled.try_recv().ok()).collect()
    }
}

pub async fn test_gateway() -> TestGateway {
    test_gateway_with(|_| {}).await
}

pub async fn test_gateway_with<F: FnOnce(&mut GatewayOptions)>(configure: F) -> TestGateway {
    prepare_test_env();
    let dir = tempfile::tempdir().expect("Error creating a temporary directory");
    let store = FileStore::open(dir.path().join("data")).await.expect("Error opening the file store");
    let catalog = test_catalog(&dir).await;
    let provider = ScriptedProvider::default();
    let chain = FixtureChain::new(1);
    let mut options = test_options();
    configure(&mut options);
    let (paid_tx, paid) = mpsc::channel(64);
    let (annulled_tx, annulled) = mpsc::channel(64);
    let producers = EventProducers {
        order_paid_producer: vec![EventProducer::new(paid_tx)],
        order_annulled_producer: vec![EventProducer::new(annulled_tx)],
    };
    let api = OrderFlowApi::new(store.clone(), provider.clone(), chain.clone(), catalog.clone(), options, producers)
        .expect("Error creating the gateway");
    TestGateway { dir, api, store, provider, chain, catalog, paid, annulled }
}
