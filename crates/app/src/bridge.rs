//! Pool-Submission Bridge
//!
//! Locally submitted transactions are admitted to the check view first and
//! only then forwarded to the consensus engine. The check view lock is held
//! for validation only, never across the forward.

use crate::{
    check::PoolValidator,
    consensus_client::{ConsensusClient, SubmitAck},
    error::{ForwardError, SubmitError},
};
use bft_ledger::ExecutionEngine;
use bft_types::H256;
use std::{sync::Arc, time::Duration};

/// Default bound on waiting for the consensus engine's acknowledgement
pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SubmissionBridge<E> {
    validator: Arc<PoolValidator<E>>,
    client: Arc<dyn ConsensusClient>,
    forward_timeout: Duration,
}

impl<E: ExecutionEngine> SubmissionBridge<E> {
    pub fn new(
        validator: Arc<PoolValidator<E>>,
        client: Arc<dyn ConsensusClient>,
        forward_timeout: Duration,
    ) -> Self {
        Self {
            validator,
            client,
            forward_timeout,
        }
    }

    /// Admit `raw` to the pool and forward it to the consensus engine
    ///
    /// A forwarding failure leaves the admission in place; recover with
    /// [`SubmissionBridge::forward`], not by submitting again (the nonce is
    /// already consumed in the check view).
    pub async fn submit(&self, raw: &[u8]) -> Result<H256, SubmitError> {
        let tx = self
            .validator
            .codec()
            .decode(raw)
            .map_err(|e| SubmitError::Rejected(e.into()))?;

        let code = self.validator.check_decoded(&tx);
        if !code.is_ok() {
            return Err(SubmitError::Rejected(code));
        }

        match self.forward(raw).await {
            Ok(ack) => {
                tracing::debug!("Forwarded {} (consensus hash {})", tx.hash, ack.hash);
                Ok(tx.hash)
            }
            Err(e) => {
                tracing::warn!("Admitted {} locally but forwarding failed: {}", tx.hash, e);
                Err(e.into())
            }
        }
    }

    /// Forward raw bytes without validating them again
    pub async fn forward(&self, raw: &[u8]) -> Result<SubmitAck, ForwardError> {
        match tokio::time::timeout(self.forward_timeout, self.client.submit_transaction(raw)).await
        {
            Ok(result) => result,
            Err(_) => Err(ForwardError::Timeout(self.forward_timeout)),
        }
    }

    /// Probe the consensus engine until it answers or `attempts` run out
    pub async fn wait_for_consensus(
        &self,
        attempts: u32,
        interval: Duration,
    ) -> Result<(), ForwardError> {
        let mut last_error = ForwardError::Transport("no attempts made".to_string());

        for attempt in 1..=attempts {
            let probe = tokio::time::timeout(self.forward_timeout, self.client.status()).await;
            match probe {
                Ok(Ok(_)) => {
                    tracing::info!("Consensus engine reachable after {} attempt(s)", attempt);
                    return Ok(());
                }
                Ok(Err(e)) => last_error = e,
                Err(_) => last_error = ForwardError::Timeout(self.forward_timeout),
            }

            tracing::debug!(
                "Consensus engine not ready (attempt {}/{}): {}",
                attempt,
                attempts,
                last_error
            );
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }

        Err(last_error)
    }
}
