//! Product service - static product catalog.

use crate::config::PRODUCTS;

use super::container::{Component, ServiceLifetime};

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

#[cfg_attr(any(test, feature = "test-utils"), automock)]
pub trait ProductService: Send + Sync {
    /// Names of the products in production.
    fn production(&self) -> Vec<String>;
}

#[derive(Debug, Default)]
pub struct ProductCatalog;

impl ProductCatalog {
    pub fn new() -> Self {
        Self
    }
}

impl Component for ProductCatalog {
    const LIFETIME: Option<ServiceLifetime> = Some(ServiceLifetime::Transient);
}

impl ProductService for ProductCatalog {
    fn production(&self) -> Vec<String> {
        PRODUCTS.iter().map(|p| p.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lists_products() {
        assert_eq!(ProductCatalog::new().production(), vec!["Product1", "Product2"]);
        assert_eq!(ProductCatalog::lifetime(), ServiceLifetime::Transient);
    }
}
