//! Authenticated-identity providers.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

/// Resolves the currently authenticated user, if any.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
  async fn current_user_id(&self) -> Option<String>;
}

/// Identity fixed at construction; `None` means signed out.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(pub Option<String>);

#[async_trait]
impl IdentityProvider for StaticIdentity {
  async fn current_user_id(&self) -> Option<String> {
    self.0.clone()
  }
}

/// Resolves the user behind a session token via the auth endpoint.
#[derive(Clone)]
pub struct RestIdentity {
  http: reqwest::Client,
  user_url: Option<Url>,
  api_key: String,
  access_token: Option<String>,
}

#[derive(Deserialize)]
struct AuthUser {
  id: String,
}

impl RestIdentity {
  pub fn new(base_url: &str, api_key: String, access_token: Option<String>) -> Self {
    let base = if base_url.ends_with('/') {
      base_url.to_string()
    } else {
      format!("{}/", base_url)
    };
    let user_url = Url::parse(&base).and_then(|u| u.join("auth/v1/user")).ok();

    Self {
      http: reqwest::Client::new(),
      user_url,
      api_key,
      access_token,
    }
  }
}

#[async_trait]
impl IdentityProvider for RestIdentity {
  async fn current_user_id(&self) -> Option<String> {
    let token = self.access_token.as_deref()?;
    let url = self.user_url.clone()?;

    let response = self
      .http
      .get(url)
      .header("apikey", &self.api_key)
      .bearer_auth(token)
      .send()
      .await;

    let response = match response {
      Ok(r) if r.status().is_success() => r,
      Ok(r) => {
        debug!(status = r.status().as_u16(), "session token rejected");
        return None;
      }
      Err(e) => {
        debug!("identity lookup failed: {}", e);
        return None;
      }
    };

    response.json::<AuthUser>().await.ok().map(|u| u.id)
  }
}
