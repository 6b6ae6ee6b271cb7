//! Credential broker
//!
//! Exchanges a workload-identity assertion for a scoped, short-lived
//! access token. No long-lived static secret is involved: the trust
//! relationship is pre-provisioned at the identity provider and the run
//! presents only its service account binding.
//!
//! Credentials are cached per scope for their stated lifetime and
//! re-acquired once expired. A single bounded attempt is made per
//! acquisition; authentication failures are not treated as transient.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

use capstan_core::domain::credential::{Credential, Scope};
use capstan_core::error::{EngineError, EngineResult};

/// Identity provider binding for one run
#[derive(Debug, Clone)]
pub struct ProviderBinding {
    pub provider_url: String,
    pub service_account: String,
}

/// Seam for the token exchange with the identity provider
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Exchanges the workload-identity assertion for a credential
    /// covering the given scope
    async fn exchange(&self, binding: &ProviderBinding, scope: &Scope)
    -> EngineResult<Credential>;
}

/// Wire request for the token exchange endpoint
#[derive(Debug, Serialize)]
struct ExchangeRequest<'a> {
    grant_type: &'static str,
    service_account: &'a str,
    scope: &'a str,
}

/// Wire response from the token exchange endpoint
#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    access_token: String,
    expires_in: i64,
}

/// Production token exchange over HTTP
pub struct HttpTokenExchange {
    client: reqwest::Client,
}

impl HttpTokenExchange {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTokenExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange(
        &self,
        binding: &ProviderBinding,
        scope: &Scope,
    ) -> EngineResult<Credential> {
        let request = ExchangeRequest {
            grant_type: "workload-identity",
            service_account: &binding.service_account,
            scope: scope.as_str(),
        };

        let response = self
            .client
            .post(&binding.provider_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::AuthDenied(format!("exchange request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::AuthDenied(format!(
                "provider returned {}: {}",
                status,
                body.trim()
            )));
        }

        let parsed: ExchangeResponse = response
            .json()
            .await
            .map_err(|e| EngineError::AuthDenied(format!("malformed provider response: {}", e)))?;

        Ok(Credential::new(
            parsed.access_token,
            scope.clone(),
            parsed.expires_in,
        ))
    }
}

/// Per-run credential broker with a per-scope cache
pub struct CredentialBroker {
    exchange: std::sync::Arc<dyn TokenExchange>,
    timeout: Duration,
    binding: Mutex<Option<ProviderBinding>>,
    cache: Mutex<HashMap<Scope, Credential>>,
}

impl CredentialBroker {
    pub fn new(exchange: std::sync::Arc<dyn TokenExchange>, timeout: Duration) -> Self {
        Self {
            exchange,
            timeout,
            binding: Mutex::new(None),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Binds the run to an identity provider
    ///
    /// Called by the authenticate step. Rebinding clears the cache since
    /// cached credentials came from the previous provider.
    pub fn set_provider(&self, binding: ProviderBinding) {
        info!(
            "Binding run to identity provider {} as {}",
            binding.provider_url, binding.service_account
        );
        *self.binding.lock().unwrap() = Some(binding);
        self.cache.lock().unwrap().clear();
    }

    /// Acquires a non-expired credential for the given scope
    ///
    /// Cache hit returns the live credential. Otherwise performs one
    /// bounded exchange attempt: `AuthTimeout` if the provider does not
    /// answer in time, `AuthDenied` if it rejects the exchange.
    pub async fn acquire(&self, scope: &Scope) -> EngineResult<Credential> {
        {
            let mut cache = self.cache.lock().unwrap();
            match cache.get(scope) {
                Some(cached) if !cached.is_expired() => {
                    debug!("Credential cache hit for scope '{}'", scope);
                    return Ok(cached.clone());
                }
                Some(_) => {
                    debug!("Credential for scope '{}' expired, re-acquiring", scope);
                    cache.remove(scope);
                }
                None => {}
            }
        }

        let binding = self
            .binding
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| {
                EngineError::AuthDenied("no identity provider bound for this run".to_string())
            })?;

        info!("Acquiring credential for scope '{}'", scope);

        let credential = tokio::time::timeout(self.timeout, self.exchange.exchange(&binding, scope))
            .await
            .map_err(|_| EngineError::AuthTimeout {
                timeout_secs: self.timeout.as_secs(),
            })??;

        self.cache
            .lock()
            .unwrap()
            .insert(scope.clone(), credential.clone());

        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Mock exchange that mints numbered tokens with a fixed lifetime
    struct CountingExchange {
        calls: AtomicU32,
        lifetime_secs: i64,
    }

    impl CountingExchange {
        fn new(lifetime_secs: i64) -> Self {
            Self {
                calls: AtomicU32::new(0),
                lifetime_secs,
            }
        }
    }

    #[async_trait]
    impl TokenExchange for CountingExchange {
        async fn exchange(
            &self,
            _binding: &ProviderBinding,
            scope: &Scope,
        ) -> EngineResult<Credential> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Credential::new(
                format!("token-{}", n),
                scope.clone(),
                self.lifetime_secs,
            ))
        }
    }

    struct DenyingExchange;

    #[async_trait]
    impl TokenExchange for DenyingExchange {
        async fn exchange(
            &self,
            _binding: &ProviderBinding,
            _scope: &Scope,
        ) -> EngineResult<Credential> {
            Err(EngineError::AuthDenied("trust relationship unknown".to_string()))
        }
    }

    struct StalledExchange;

    #[async_trait]
    impl TokenExchange for StalledExchange {
        async fn exchange(
            &self,
            _binding: &ProviderBinding,
            scope: &Scope,
        ) -> EngineResult<Credential> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Credential::new("late", scope.clone(), 60))
        }
    }

    fn binding() -> ProviderBinding {
        ProviderBinding {
            provider_url: "https://sts.example.com/token".to_string(),
            service_account: "ci-uploader@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_acquire_caches_per_scope() {
        let exchange = Arc::new(CountingExchange::new(3600));
        let broker = CredentialBroker::new(exchange.clone(), Duration::from_secs(5));
        broker.set_provider(binding());

        let scope = Scope::new("coverage:write");
        let first = broker.acquire(&scope).await.unwrap();
        let second = broker.acquire(&scope).await.unwrap();

        assert_eq!(first.token, second.token);
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);

        // a different scope is a separate exchange
        broker.acquire(&Scope::new("artifacts:read")).await.unwrap();
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_credential_is_reacquired_distinct() {
        // lifetime of zero seconds expires immediately
        let exchange = Arc::new(CountingExchange::new(0));
        let broker = CredentialBroker::new(exchange.clone(), Duration::from_secs(5));
        broker.set_provider(binding());

        let scope = Scope::new("coverage:write");
        let first = broker.acquire(&scope).await.unwrap();
        let second = broker.acquire(&scope).await.unwrap();

        assert_ne!(first.token, second.token);
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_acquire_without_binding_is_denied() {
        let broker = CredentialBroker::new(
            Arc::new(CountingExchange::new(60)),
            Duration::from_secs(5),
        );

        let err = broker.acquire(&Scope::new("coverage:write")).await.unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn test_denied_exchange_propagates() {
        let broker = CredentialBroker::new(Arc::new(DenyingExchange), Duration::from_secs(5));
        broker.set_provider(binding());

        let err = broker.acquire(&Scope::new("coverage:write")).await.unwrap_err();
        assert!(matches!(err, EngineError::AuthDenied(_)));
    }

    #[tokio::test]
    async fn test_stalled_exchange_times_out() {
        let broker = CredentialBroker::new(Arc::new(StalledExchange), Duration::from_millis(20));
        broker.set_provider(binding());

        let err = broker.acquire(&Scope::new("coverage:write")).await.unwrap_err();
        assert!(matches!(err, EngineError::AuthTimeout { .. }));
    }

    #[tokio::test]
    async fn test_rebinding_clears_cache() {
        let exchange = Arc::new(CountingExchange::new(3600));
        let broker = CredentialBroker::new(exchange.clone(), Duration::from_secs(5));
        broker.set_provider(binding());

        let scope = Scope::new("coverage:write");
        broker.acquire(&scope).await.unwrap();
        broker.set_provider(binding());
        broker.acquire(&scope).await.unwrap();

        assert_eq!(exchange.calls.load(Ordering::SeqCst), 2);
    }
}
