use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{decode, DecodingKey, Validation};
use parking_lot::RwLock;
use reqwest::{multipart::Form, Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::{
    config::Config,
    error::{ClientError, Result},
    models::user::TokenResponse,
};

#[derive(Debug, Deserialize)]
struct AccessClaims {
    exp: i64,
}

/// 会话令牌，只保存在内存中
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    tokens: Arc<RwLock<Option<TokenResponse>>>,
}

impl TokenStore {
    pub fn set(&self, tokens: TokenResponse) {
        *self.tokens.write() = Some(tokens);
    }

    pub fn clear(&self) {
        self.tokens.write().take();
    }

    pub fn access(&self) -> Option<String> {
        self.tokens.read().as_ref().map(|t| t.access.clone())
    }

    pub fn refresh(&self) -> Option<String> {
        self.tokens.read().as_ref().map(|t| t.refresh.clone())
    }

    /// 访问令牌的过期时间（Unix 秒），不校验签名
    pub fn access_expires_at(&self) -> Result<Option<i64>> {
        let Some(token) = self.access() else {
            return Ok(None);
        };

        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<AccessClaims>(&token, &DecodingKey::from_secret(&[]), &validation)?;
        Ok(Some(data.claims.exp))
    }

    /// 持有未过期的访问令牌
    pub fn is_authenticated(&self) -> bool {
        match self.access_expires_at() {
            Ok(Some(exp)) => exp > Utc::now().timestamp(),
            Ok(None) => false,
            Err(e) => {
                warn!("Unreadable access token: {}", e);
                false
            }
        }
    }
}

/// REST API 客户端
///
/// 所有路径都相对于 `API_BASE_URL`；登录后自动附带 Bearer 令牌。
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    tokens: TokenStore,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let mut base = config.api_base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;

        let http = Client::builder().timeout(config.request_timeout()).build()?;

        Ok(Self {
            http,
            base_url,
            tokens: TokenStore::default(),
        })
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        self.send(self.http.get(url)).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        self.send(self.http.post(url).json(body)).await
    }

    /// 无请求体的 POST
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        self.send(self.http.post(url)).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        self.send(self.http.put(url).json(body)).await
    }

    /// DELETE，忽略响应体
    pub async fn delete(&self, path: &str) -> Result<()> {
        let url = self.endpoint(path)?;
        self.execute(self.http.delete(url)).await?;
        Ok(())
    }

    pub async fn post_multipart<T: DeserializeOwned>(&self, path: &str, form: Form) -> Result<T> {
        let url = self.endpoint(path)?;
        self.send(self.http.post(url).multipart(form)).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let body = self.execute(request).await?;
        let body = if body.trim().is_empty() { "{}" } else { body.as_str() };
        Ok(serde_json::from_str(body)?)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<String> {
        let request = match self.tokens.access() {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        let url = response.url().clone();
        let body = response.text().await?;
        debug!("{} -> {}", url, status);

        if status.is_success() {
            Ok(body)
        } else {
            warn!("Request to {} failed with {}", url, status);
            Err(ClientError::from_response(status, &body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn token_with_exp(exp: i64) -> String {
        encode(
            &Header::default(),
            &json!({"exp": exp, "user_id": "u1"}),
            &EncodingKey::from_secret(b"server-secret"),
        )
        .unwrap()
    }

    #[test]
    fn test_token_expiry_without_signature() {
        let store = TokenStore::default();
        assert!(!store.is_authenticated());

        store.set(TokenResponse {
            access: token_with_exp(Utc::now().timestamp() + 3600),
            refresh: "r".to_string(),
        });
        assert!(store.is_authenticated());

        store.set(TokenResponse {
            access: token_with_exp(Utc::now().timestamp() - 10),
            refresh: "r".to_string(),
        });
        assert!(!store.is_authenticated());

        store.set(TokenResponse {
            access: "not-a-jwt".to_string(),
            refresh: "r".to_string(),
        });
        assert!(!store.is_authenticated());

        store.clear();
        assert!(store.access().is_none());
    }

    #[test]
    fn test_endpoint_joins_relative_to_base() {
        let api = ApiClient::new(&Config::with_base_url("http://localhost:8000/api")).unwrap();
        assert_eq!(api.endpoint("/posts/1/like/").unwrap().as_str(), "http://localhost:8000/api/posts/1/like/");
        assert_eq!(api.endpoint("me/").unwrap().as_str(), "http://localhost:8000/api/me/");
    }
}
