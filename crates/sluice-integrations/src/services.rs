//! Typed clients for the external services Sluice integrates with.
//!
//! Each typed client wraps a [`ServiceClient`] and exposes the operations
//! webhook handlers forward to. The [`ServiceRegistry`] constructs all of
//! them explicitly from configuration; nothing here is global.

use std::{collections::HashMap, sync::Arc};

use serde_json::Value;

use crate::{
    circuit::CircuitBreakerManager,
    client::{ClientConfig, ServiceClient},
    error::{IntegrationError, Result},
};
use sluice_core::WebhookSource;

/// Base URLs for every integrated service.
#[derive(Debug, Clone)]
pub struct IntegrationEndpoints {
    /// User / HR service base URL.
    pub user_service_url: String,
    /// Payment and billing service base URL.
    pub payment_service_url: String,
    /// Email and notification service base URL.
    pub communication_service_url: String,
}

fn required_str<'a>(data: &'a Value, field: &str) -> Result<&'a str> {
    data.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| IntegrationError::invalid_payload(format!("missing field {field}")))
}

/// Client for the user service.
pub struct UserServiceClient {
    client: Arc<ServiceClient>,
}

impl UserServiceClient {
    /// Wraps the underlying service client.
    pub fn new(client: Arc<ServiceClient>) -> Self {
        Self { client }
    }

    /// Provisions a user from a `user.created` payload.
    pub async fn create_user(&self, data: &Value) -> Result<Value> {
        self.client.post("/users", data).await
    }

    /// Updates a user from a `user.updated` payload.
    pub async fn update_user(&self, data: &Value) -> Result<Value> {
        let user_id = required_str(data, "user_id")?;
        self.client.put(&format!("/users/{user_id}"), data).await
    }

    /// Deprovisions a user from a `user.deleted` payload.
    pub async fn delete_user(&self, data: &Value) -> Result<Value> {
        let user_id = required_str(data, "user_id")?;
        self.client.delete(&format!("/users/{user_id}")).await
    }

    /// Fetches a user by id.
    pub async fn get_user(&self, user_id: &str) -> Result<Value> {
        self.client.get(&format!("/users/{user_id}")).await
    }
}

/// Client for the payment service.
pub struct PaymentServiceClient {
    client: Arc<ServiceClient>,
}

impl PaymentServiceClient {
    /// Wraps the underlying service client.
    pub fn new(client: Arc<ServiceClient>) -> Self {
        Self { client }
    }

    /// Registers a subscription from a `subscription.created` payload.
    pub async fn create_subscription(&self, data: &Value) -> Result<Value> {
        self.client.post("/subscriptions", data).await
    }

    /// Updates a subscription record.
    pub async fn update_subscription(&self, data: &Value) -> Result<Value> {
        let subscription_id = required_str(data, "subscription_id")?;
        self.client.put(&format!("/subscriptions/{subscription_id}"), data).await
    }

    /// Cancels a subscription.
    pub async fn cancel_subscription(&self, subscription_id: &str) -> Result<Value> {
        self.client.delete(&format!("/subscriptions/{subscription_id}")).await
    }

    /// Reconciles a payment from a `payment.failed` payload.
    pub async fn process_payment(&self, data: &Value) -> Result<Value> {
        self.client.post("/payments", data).await
    }
}

/// Client for the communication service.
pub struct CommunicationServiceClient {
    client: Arc<ServiceClient>,
}

impl CommunicationServiceClient {
    /// Wraps the underlying service client.
    pub fn new(client: Arc<ServiceClient>) -> Self {
        Self { client }
    }

    /// Sends a transactional email.
    pub async fn send_email(&self, data: &Value) -> Result<Value> {
        self.client.post("/emails", data).await
    }

    /// Sends an in-app notification.
    pub async fn send_notification(&self, data: &Value) -> Result<Value> {
        self.client.post("/notifications", data).await
    }

    /// Reconciles delivery state from a `message.delivered` or
    /// `message.bounced` payload.
    pub async fn delivery_status(&self, data: &Value) -> Result<Value> {
        let message_id = required_str(data, "message_id")?;
        self.client.get(&format!("/messages/{message_id}/status")).await
    }
}

/// Explicitly constructed set of all service clients.
pub struct ServiceRegistry {
    /// User service operations.
    pub user: Arc<UserServiceClient>,
    /// Payment service operations.
    pub payment: Arc<PaymentServiceClient>,
    /// Communication service operations.
    pub communication: Arc<CommunicationServiceClient>,
    raw: HashMap<&'static str, Arc<ServiceClient>>,
}

impl ServiceRegistry {
    /// Builds all clients from endpoint configuration.
    ///
    /// One reqwest client (and its connection pool) is shared across the
    /// registry; each service gets its own breaker key.
    pub fn new(
        endpoints: &IntegrationEndpoints,
        config: &ClientConfig,
        breaker: Arc<CircuitBreakerManager>,
    ) -> Result<Self> {
        let http = config.build_http_client()?;

        let user_raw = Arc::new(ServiceClient::new(
            WebhookSource::UserService.as_str(),
            &endpoints.user_service_url,
            http.clone(),
            breaker.clone(),
            config.timeout,
        )?);
        let payment_raw = Arc::new(ServiceClient::new(
            WebhookSource::PaymentService.as_str(),
            &endpoints.payment_service_url,
            http.clone(),
            breaker.clone(),
            config.timeout,
        )?);
        let communication_raw = Arc::new(ServiceClient::new(
            WebhookSource::CommunicationService.as_str(),
            &endpoints.communication_service_url,
            http,
            breaker,
            config.timeout,
        )?);

        let mut raw = HashMap::new();
        raw.insert(WebhookSource::UserService.as_str(), user_raw.clone());
        raw.insert(WebhookSource::PaymentService.as_str(), payment_raw.clone());
        raw.insert(WebhookSource::CommunicationService.as_str(), communication_raw.clone());

        Ok(Self {
            user: Arc::new(UserServiceClient::new(user_raw)),
            payment: Arc::new(PaymentServiceClient::new(payment_raw)),
            communication: Arc::new(CommunicationServiceClient::new(communication_raw)),
            raw,
        })
    }

    /// Looks up the raw client for a service name.
    pub fn client(&self, service: &str) -> Option<Arc<ServiceClient>> {
        self.raw.get(service).cloned()
    }

    /// Names of all registered services, in canonical order.
    pub fn service_names(&self) -> impl Iterator<Item = &'static str> {
        WebhookSource::ALL.into_iter().map(WebhookSource::as_str)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use sluice_core::TestClock;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::circuit::CircuitConfig;

    async fn registry(server: &MockServer) -> ServiceRegistry {
        let breaker = Arc::new(CircuitBreakerManager::new(
            CircuitConfig::default(),
            Arc::new(TestClock::new()),
        ));
        let endpoints = IntegrationEndpoints {
            user_service_url: server.uri(),
            payment_service_url: server.uri(),
            communication_service_url: server.uri(),
        };
        let config = ClientConfig { timeout: Duration::from_secs(2), ..Default::default() };
        ServiceRegistry::new(&endpoints, &config, breaker).expect("registry should build")
    }

    #[tokio::test]
    async fn update_user_targets_the_user_path() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/users/u_7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user_id": "u_7"})))
            .expect(1)
            .mount(&server)
            .await;

        let registry = registry(&server).await;
        let result =
            registry.user.update_user(&json!({"user_id": "u_7", "department": "support"})).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn update_user_without_id_is_invalid_payload() {
        let server = MockServer::start().await;
        let registry = registry(&server).await;

        let err = registry.user.update_user(&json!({"department": "support"})).await.unwrap_err();
        assert!(matches!(err, IntegrationError::InvalidPayload(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn delivery_status_targets_the_message_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/messages/m_1/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "delivered"})))
            .expect(1)
            .mount(&server)
            .await;

        let registry = registry(&server).await;
        let result = registry.communication.delivery_status(&json!({"message_id": "m_1"})).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn registry_resolves_known_services_only() {
        let server = MockServer::start().await;
        let registry = registry(&server).await;

        assert!(registry.client("user_service").is_some());
        assert!(registry.client("payment_service").is_some());
        assert!(registry.client("communication_service").is_some());
        assert!(registry.client("ledger_service").is_none());
    }
}
