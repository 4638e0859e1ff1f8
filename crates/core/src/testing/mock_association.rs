//! Mock association service for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::services::{AssociatedItem, AssociationRequest, AssociationService, ServiceError};

/// Mock implementation of the AssociationService trait.
///
/// By default a request yields `count` variants named
/// `"<category> variant <n>"`, each with its own prompt.
///
/// # Example
///
/// ```rust,ignore
/// use forge_core::testing::MockAssociationService;
///
/// let associations = MockAssociationService::new();
/// associations.set_next_error(ServiceError::Http("reset".into())).await;
/// ```
#[derive(Debug)]
pub struct MockAssociationService {
    requests: Arc<RwLock<Vec<AssociationRequest>>>,
    /// Fixed reply used instead of the generated variants.
    reply: Arc<RwLock<Option<Vec<AssociatedItem>>>>,
    next_error: Arc<RwLock<Option<ServiceError>>>,
}

impl Default for MockAssociationService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAssociationService {
    pub fn new() -> Self {
        Self {
            requests: Arc::new(RwLock::new(Vec::new())),
            reply: Arc::new(RwLock::new(None)),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn recorded_requests(&self) -> Vec<AssociationRequest> {
        self.requests.read().await.clone()
    }

    /// Answer every request with `items`.
    pub async fn set_reply(&self, items: Vec<AssociatedItem>) {
        *self.reply.write().await = Some(items);
    }

    /// Configure the next call to fail with the given error.
    pub async fn set_next_error(&self, error: ServiceError) {
        *self.next_error.write().await = Some(error);
    }
}

/// Variant with a name and prompt derived from `category` and `n`.
pub fn variant(category: &str, n: usize) -> AssociatedItem {
    AssociatedItem {
        name: format!("{} variant {}", category, n),
        subcategory: String::new(),
        description: format!("{} number {}", category, n),
        prompt: format!("{} variant {}, studio lighting", category, n),
        specifications: serde_json::Map::new(),
        tags: vec![category.to_string()],
    }
}

#[async_trait]
impl AssociationService for MockAssociationService {
    fn name(&self) -> &str {
        "mock"
    }

    async fn associate(
        &self,
        request: &AssociationRequest,
    ) -> Result<Vec<AssociatedItem>, ServiceError> {
        self.requests.write().await.push(request.clone());

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        if let Some(items) = self.reply.read().await.clone() {
            return Ok(items);
        }
        Ok((1..=request.count)
            .map(|n| variant(&request.category, n))
            .collect())
    }
}
