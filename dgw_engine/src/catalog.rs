//! The product catalog and the package resolver.
//!
//! Products are listed in a JSON document of the form
//! ```json
//! { "products": [
//!     { "product_id": "prod-1", "title": "Starter kit", "price": "29.00", "currency": "usd", "package": "prod-1.zip" },
//!     { "product_id": "prod-2", "title": "Pro kit", "price": "29.00", "package": "prod-2.zip",
//!       "price_wei": "116000000000000000" }
//! ]}
//! ```
//! Packages are files in a single packages directory. They are built by the packaging pipeline and only ever read
//! here.
use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use log::*;
use serde::Deserialize;

use crate::traits::{Artifact, ArtifactResolver, CatalogError, Product, ProductCatalog};

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    products: Vec<Product>,
}

#[derive(Debug, Clone)]
pub struct FileCatalog {
    products: Arc<BTreeMap<String, Product>>,
    packages_dir: Arc<PathBuf>,
}

impl FileCatalog {
    pub fn from_products<P: AsRef<Path>>(products: Vec<Product>, packages_dir: P) -> Self {
        let products = products.into_iter().map(|p| (p.product_id.clone(), p)).collect::<BTreeMap<_, _>>();
        Self { products: Arc::new(products), packages_dir: Arc::new(packages_dir.as_ref().to_path_buf()) }
    }

    /// Loads the catalog file. A missing file is an empty catalog; a malformed one is an error.
    pub async fn load<P1: AsRef<Path>, P2: AsRef<Path>>(catalog_path: P1, packages_dir: P2) -> Result<Self, CatalogError> {
        let path = catalog_path.as_ref();
        let products = match tokio::fs::read(path).await {
            Ok(bytes) => {
                let file: CatalogFile =
                    serde_json::from_slice(&bytes).map_err(|e| CatalogError::Parse(format!("{}: {e}", path.display())))?;
                file.products
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("🛍️ No product catalog found at {}. Nothing is for sale.", path.display());
                Vec::new()
            },
            Err(e) => return Err(CatalogError::Io(format!("{}: {e}", path.display()))),
        };
        info!("🛍️ Loaded {} products from {}", products.len(), path.display());
        Ok(Self::from_products(products, packages_dir))
    }

    pub fn packages_dir(&self) -> &Path {
        self.packages_dir.as_path()
    }
}

impl ProductCatalog for FileCatalog {
    async fn fetch_product(&self, product_id: &str) -> Result<Option<Product>, CatalogError> {
        Ok(self.products.get(product_id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>, CatalogError> {
        Ok(self.products.values().cloned().collect())
    }
}

impl ArtifactResolver for FileCatalog {
    async fn resolve_artifact(&self, product: &Product) -> Result<Artifact, CatalogError> {
        let relative = Path::new(&product.package);
        let contained = !product.package.is_empty() && relative.components().all(|c| matches!(c, Component::Normal(_)));
        if !contained {
            warn!("🛍️ Package name '{}' for {} escapes the packages directory", product.package, product.product_id);
            return Err(CatalogError::PackageNotFound(product.product_id.clone()));
        }
        let package_path = self.packages_dir.join(relative);
        match tokio::fs::metadata(&package_path).await {
            Ok(meta) if meta.is_file() => {},
            Ok(_) => return Err(CatalogError::PackageNotFound(product.product_id.clone())),
            Err(e) => {
                debug!("🛍️ Package {} is not available. {e}", package_path.display());
                return Err(CatalogError::PackageNotFound(product.product_id.clone()));
            },
        }
        let filename = package_path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| product.package.clone());
        Ok(Artifact { product_id: product.product_id.clone(), package_path, filename })
    }
}
