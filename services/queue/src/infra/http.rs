use std::collections::HashMap;

use anyhow::Context as _;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;

use paynotify_domain::id::{ClientId, OrderId, RecipientId};

use crate::domain::repository::{EligibilityPort, OrderDataPort, RecipientPort};
use crate::domain::types::{
    ContactRole, CuratorLink, OrderSummary, PaymentSummary, Recipient, RecipientCriteria,
};
use crate::error::QueueServiceError;

/// JSON client for the directory service that owns orders, contacts and user profiles.
#[derive(Clone)]
pub struct HttpDirectoryClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct CuratorsRequest<'a> {
    order_ids: &'a [OrderId],
    role: ContactRole,
}

#[derive(Debug, Serialize)]
struct OrdersRequest<'a> {
    order_ids: &'a [OrderId],
}

impl HttpDirectoryClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, QueueServiceError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let value = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .with_context(|| format!("POST {url}"))?
            .json::<T>()
            .await
            .with_context(|| format!("decode POST {url}"))?;
        Ok(value)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, QueueServiceError> {
        let url = self.url(path);
        let value = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .with_context(|| format!("GET {url}"))?
            .json::<T>()
            .await
            .with_context(|| format!("decode GET {url}"))?;
        Ok(value)
    }
}

impl RecipientPort for HttpDirectoryClient {
    async fn curators_for_orders(
        &self,
        order_ids: &[OrderId],
        role: ContactRole,
    ) -> Result<Vec<CuratorLink>, QueueServiceError> {
        if order_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.post_json("/internal/orders/curators", &CuratorsRequest { order_ids, role })
            .await
    }

    async fn client_level_recipients(
        &self,
        client_id: ClientId,
    ) -> Result<Vec<RecipientId>, QueueServiceError> {
        self.get_json(&format!("/internal/clients/{client_id}/accounting-contacts"))
            .await
    }
}

impl EligibilityPort for HttpDirectoryClient {
    async fn filter(
        &self,
        criteria: &RecipientCriteria,
    ) -> Result<Vec<Recipient>, QueueServiceError> {
        if criteria.ids.is_empty() {
            return Ok(Vec::new());
        }
        self.post_json("/internal/recipients/filter", criteria).await
    }
}

impl OrderDataPort for HttpDirectoryClient {
    async fn load_orders(
        &self,
        ids: &[OrderId],
    ) -> Result<HashMap<OrderId, OrderSummary>, QueueServiceError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let orders: Vec<OrderSummary> = self
            .post_json("/internal/orders/summaries", &OrdersRequest { order_ids: ids })
            .await?;
        Ok(orders.into_iter().map(|o| (o.order_id, o)).collect())
    }

    async fn load_payments(
        &self,
        ids: &[OrderId],
    ) -> Result<HashMap<OrderId, PaymentSummary>, QueueServiceError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let payments: Vec<PaymentSummary> = self
            .post_json("/internal/orders/payments", &OrdersRequest { order_ids: ids })
            .await?;
        Ok(payments.into_iter().map(|p| (p.order_id, p)).collect())
    }
}
