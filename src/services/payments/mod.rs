pub mod paystack;

use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct InitializedPayment {
    pub authorization_url: String,
    pub reference: String,
}

#[derive(Debug, Clone)]
pub struct PaymentVerification {
    /// True only when the gateway settled the charge successfully.
    pub success: bool,
    /// Settled amount in minor currency units.
    pub amount: i64,
    /// Raw gateway status, kept for logging and reconciliation notes.
    pub gateway_status: String,
}

/// Opaque charge-and-verify boundary. `verify` must be safe to call
/// repeatedly for the same reference; a successful verification is the sole
/// trigger for confirming a booking.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn initialize(
        &self,
        email: &str,
        amount: i64,
        reference: &str,
        metadata: serde_json::Value,
    ) -> anyhow::Result<InitializedPayment>;

    async fn verify(&self, reference: &str) -> anyhow::Result<PaymentVerification>;
}
