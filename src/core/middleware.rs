use reqwest::{header, Request, Response};
use reqwest_middleware::{Middleware, Next};
use http::Extensions;
use std::sync::Arc;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Supplies the bearer token of the signed-in user, if any.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    async fn bearer_token(&self) -> Option<String>;
}

/// Attaches the app's API key and, when a user is signed in, their ID token to every request.
#[derive(Clone)]
pub struct AuthMiddleware {
    api_key: Option<String>,
    tokens: Option<Arc<dyn TokenProvider>>,
}

impl AuthMiddleware {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            tokens: None,
        }
    }

    /// A middleware that adds no credentials at all.
    pub fn anonymous() -> Self {
        Self {
            api_key: None,
            tokens: None,
        }
    }

    pub fn with_token_provider(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = Some(tokens);
        self
    }
}

fn header_value(value: &str) -> reqwest_middleware::Result<header::HeaderValue> {
    header::HeaderValue::from_str(value).map_err(|e| {
        reqwest_middleware::Error::Middleware(anyhow::anyhow!("Invalid header value: {}", e))
    })
}

#[async_trait::async_trait]
impl Middleware for AuthMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        if let Some(key) = &self.api_key {
            req.headers_mut()
                .insert(header::HeaderName::from_static(API_KEY_HEADER), header_value(key)?);
        }

        if let Some(tokens) = &self.tokens {
            if let Some(token) = tokens.bearer_token().await {
                req.headers_mut().insert(
                    header::AUTHORIZATION,
                    header_value(&format!("Bearer {}", token))?,
                );
            }
        }

        next.run(req, extensions).await
    }
}
