//! Classification service boundary
//!
//! The pipeline only sees the [`Classifier`] trait. [`GeminiClassifier`] talks
//! to the Generative Language API; [`RateLimitedClassifier`] wraps any
//! implementation with the sliding-window limiter.

mod gemini;
mod json;
mod prompt;
mod rate_limiter;

pub use gemini::{GeminiClassifier, GeminiConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use json::extract_json_object;
pub use prompt::build_prompt;
pub use rate_limiter::SlidingWindowLimiter;

use crate::error::ClassifierError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Structured answer for one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub doc_type: String,
    pub date: String,
    pub topic: String,
    pub owner: String,
    /// Category name as returned; resolved against the category set by the caller
    pub folder: String,
    pub keywords: Vec<String>,
}

/// Binary payload sent alongside the prompt
#[derive(Debug, Clone)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// One classification call
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    pub prompt: String,
    pub content: Option<String>,
    pub asset: Option<Upload>,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        request: ClassificationRequest,
    ) -> Result<ClassificationResult, ClassifierError>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Applies a [`SlidingWindowLimiter`] in front of another classifier
pub struct RateLimitedClassifier<C> {
    inner: C,
    limiter: SlidingWindowLimiter,
}

impl<C: Classifier> RateLimitedClassifier<C> {
    pub fn new(inner: C, limiter: SlidingWindowLimiter) -> Self {
        Self { inner, limiter }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: Classifier> Classifier for RateLimitedClassifier<C> {
    async fn classify(
        &self,
        request: ClassificationRequest,
    ) -> Result<ClassificationResult, ClassifierError> {
        self.limiter.acquire().await;
        self.inner.classify(request).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
