use std::sync::Arc;

use anyhow::{Error, Result};
use async_trait::async_trait;

use super::core::{FragmentStream, Message, completion_stream};

/// Anything that can turn a transcript into a stream of response
/// fragments.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn stream(&self, messages: Vec<Message>, model: &str) -> Result<FragmentStream, Error>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn stream(&self, messages: Vec<Message>, model: &str) -> Result<FragmentStream, Error> {
        (**self).stream(messages, model).await
    }
}

/// Client for an OpenAI compatible chat completion API.
///
/// The client is an immutable value. When the API key changes a new
/// client is built instead of updating this one.
#[derive(Clone)]
pub struct Client {
    api_base_url: String,
    api_key: String,
}

impl Client {
    pub fn new(api_base_url: &str, api_key: &str) -> Self {
        Self {
            api_base_url: api_base_url.to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[async_trait]
impl Transport for Client {
    async fn stream(&self, messages: Vec<Message>, model: &str) -> Result<FragmentStream, Error> {
        tracing::debug!(
            "Requesting completion from {} with {} messages",
            self.api_base_url,
            messages.len()
        );
        completion_stream(&messages, &self.api_base_url, &self.api_key, model).await
    }
}
