use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

use super::{InitializedPayment, PaymentProvider, PaymentVerification};

pub struct PaystackProvider {
    secret_key: String,
    client: reqwest::Client,
}

impl PaystackProvider {
    pub fn new(secret_key: String) -> Self {
        Self {
            secret_key,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct InitializeResponse {
    data: InitializeData,
}

#[derive(Deserialize)]
struct InitializeData {
    authorization_url: String,
    reference: String,
}

#[derive(Deserialize)]
struct VerifyResponse {
    data: VerifyData,
}

#[derive(Deserialize)]
struct VerifyData {
    status: String,
    amount: i64,
}

#[async_trait]
impl PaymentProvider for PaystackProvider {
    async fn initialize(
        &self,
        email: &str,
        amount: i64,
        reference: &str,
        metadata: serde_json::Value,
    ) -> anyhow::Result<InitializedPayment> {
        let body: InitializeResponse = self
            .client
            .post("https://api.paystack.co/transaction/initialize")
            .bearer_auth(&self.secret_key)
            .json(&serde_json::json!({
                "email": email,
                "amount": amount,
                "reference": reference,
                "metadata": metadata,
            }))
            .send()
            .await
            .context("failed to reach Paystack")?
            .error_for_status()
            .context("Paystack initialize returned error")?
            .json()
            .await
            .context("failed to parse Paystack initialize response")?;

        Ok(InitializedPayment {
            authorization_url: body.data.authorization_url,
            reference: body.data.reference,
        })
    }

    async fn verify(&self, reference: &str) -> anyhow::Result<PaymentVerification> {
        let url = format!("https://api.paystack.co/transaction/verify/{reference}");
        let body: VerifyResponse = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .context("failed to reach Paystack")?
            .error_for_status()
            .context("Paystack verify returned error")?
            .json()
            .await
            .context("failed to parse Paystack verify response")?;

        Ok(PaymentVerification {
            success: body.data.status == "success",
            amount: body.data.amount,
            gateway_status: body.data.status,
        })
    }
}
