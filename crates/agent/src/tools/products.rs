//! Trending-products tool

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;

use avatar_config::{FeatureFlags, ProductsSettings};
use avatar_core::{ClientEvent, Error, Persona, Product, PurchaseFlowStatus, Result};
use avatar_llm::{ToolDefinition, ToolInvocation};
use avatar_persistence::now_ms;

use super::{ToolCallContext, ToolHandler, ToolReply};
use crate::purchase::PurchaseFlowTracker;

const EMPTY_CATALOG_REPLY: &str =
    "Trending products aren't available right now, check back with me in a bit!";

/// Opaque product surface.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn trending(&self) -> Result<Vec<Product>>;
}

/// REST-backed catalog.
pub struct HttpProductCatalog {
    client: Client,
    settings: ProductsSettings,
}

impl HttpProductCatalog {
    pub fn new(settings: ProductsSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }
}

#[async_trait]
impl ProductCatalog for HttpProductCatalog {
    async fn trending(&self) -> Result<Vec<Product>> {
        let url = format!(
            "{}/products/trending",
            self.settings.endpoint.trim_end_matches('/')
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.settings.api_key)
            .send()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Upstream(format!(
                "trending fetch failed: HTTP {}",
                response.status()
            )));
        }
        response
            .json::<Vec<Product>>()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))
    }
}

/// Fixed catalog for development and tests.
pub struct StaticProductCatalog {
    products: Vec<Product>,
}

impl StaticProductCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }
}

#[async_trait]
impl ProductCatalog for StaticProductCatalog {
    async fn trending(&self) -> Result<Vec<Product>> {
        Ok(self.products.clone())
    }
}

/// `get_trending_products`
pub struct TrendingProductsTool {
    catalog: Arc<dyn ProductCatalog>,
    purchases: Arc<PurchaseFlowTracker>,
}

impl TrendingProductsTool {
    pub fn new(catalog: Arc<dyn ProductCatalog>, purchases: Arc<PurchaseFlowTracker>) -> Self {
        Self { catalog, purchases }
    }
}

#[async_trait]
impl ToolHandler for TrendingProductsTool {
    fn name(&self) -> &'static str {
        "get_trending_products"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Fetch the products currently trending so the user can browse and buy."
                .to_string(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    fn available(&self, _persona: &Persona, features: &FeatureFlags) -> bool {
        features.product_purchase
    }

    async fn handle(&self, _invocation: ToolInvocation, ctx: &ToolCallContext) -> ToolReply {
        let products = match self.catalog.trending().await {
            Ok(products) => products,
            Err(e) => {
                tracing::warn!(error = %e, "trending products fetch failed");
                return ToolReply::text(
                    "I couldn't reach the product catalog just now, let's try again in a moment.",
                );
            }
        };

        if products.is_empty() {
            return ToolReply::text(EMPTY_CATALOG_REPLY);
        }

        self.purchases.set(
            &ctx.session_id,
            PurchaseFlowStatus::ProductsDisplayed,
            Default::default(),
        );
        ctx.events
            .emit(ClientEvent::ProductsDisplay {
                products: products.clone(),
                session_id: ctx.session_id.clone(),
                timestamp: now_ms(),
            })
            .await;

        ToolReply::text(format_product_list(&products))
    }
}

fn format_product_list(products: &[Product]) -> String {
    let listed = products
        .iter()
        .enumerate()
        .map(|(index, product)| format!("{}. {} (${:.2})", index + 1, product.name, product.price))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Here's what's trending right now: {listed}. Want a closer look at any of them?"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, name: &str, price: f64) -> Product {
        Product {
            id: id.to_string(),
            name: name.to_string(),
            price,
            image_url: None,
            url: None,
        }
    }

    #[test]
    fn product_list_template() {
        let text = format_product_list(&[
            product("1", "Neon Jacket", 49.9),
            product("2", "Holo Sneakers", 120.0),
        ]);
        assert_eq!(
            text,
            "Here's what's trending right now: 1. Neon Jacket ($49.90), \
             2. Holo Sneakers ($120.00). Want a closer look at any of them?"
        );
    }
}
