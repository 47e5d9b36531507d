use thiserror::Error;

use crate::traits::data_objects::{Artifact, Product};

#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("Product {0} does not exist")]
    ProductNotFound(String),
    #[error("The package for product {0} could not be found")]
    PackageNotFound(String),
    #[error("Could not read the product catalog. {0}")]
    Io(String),
    #[error("The product catalog is malformed. {0}")]
    Parse(String),
}

/// Read-only access to the products on sale.
#[allow(async_fn_in_trait)]
pub trait ProductCatalog: Clone {
    async fn fetch_product(&self, product_id: &str) -> Result<Option<Product>, CatalogError>;

    async fn list_products(&self) -> Result<Vec<Product>, CatalogError>;
}

/// Locates packaged deliverables. Packages are produced by another system; this only ever reads them.
#[allow(async_fn_in_trait)]
pub trait ArtifactResolver: Clone {
    /// Returns the location of the product's package. A package that does not exist is
    /// [`CatalogError::PackageNotFound`].
    async fn resolve_artifact(&self, product: &Product) -> Result<Artifact, CatalogError>;
}
