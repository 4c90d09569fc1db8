//! Pool admission
//!
//! `check_tx` validates a transaction against the speculative check view and,
//! on success, applies it there so a later transaction from the same sender
//! is validated against the already-admitted one. The check view is the only
//! state this path touches.

use crate::validation::validate;
use bft_ledger::{Account, ExecutionEngine, StateView};
use bft_types::{Address, DecodedTransaction, ResultCode, TransactionCodec};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Shared handle to the check view
///
/// One lock serialises pool admissions against the re-derivation at commit.
#[derive(Clone, Debug)]
pub struct CheckState {
    view: Arc<Mutex<StateView>>,
}

impl CheckState {
    pub fn new(view: StateView) -> Self {
        Self {
            view: Arc::new(Mutex::new(view)),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, StateView> {
        self.view.lock()
    }

    /// Replace the view, dropping every speculative admission
    pub fn reset(&self, view: StateView) {
        *self.view.lock() = view;
    }

    /// Cheap copy of the current view
    pub fn snapshot(&self) -> StateView {
        self.view.lock().clone()
    }
}

/// Validates transactions for the pending pool
pub struct PoolValidator<E> {
    engine: Arc<E>,
    codec: TransactionCodec,
    check: CheckState,
}

impl<E: ExecutionEngine> PoolValidator<E> {
    pub fn new(engine: Arc<E>, codec: TransactionCodec, check: CheckState) -> Self {
        Self {
            engine,
            codec,
            check,
        }
    }

    /// Decode, validate and speculatively apply raw transaction bytes
    pub fn check_tx(&self, raw: &[u8]) -> ResultCode {
        // Decoding is pure, keep it outside the lock
        let tx = match self.codec.decode(raw) {
            Ok(tx) => tx,
            Err(e) => {
                tracing::debug!("check_tx: undecodable transaction: {}", e);
                return e.into();
            }
        };
        self.check_decoded(&tx)
    }

    /// Validate and speculatively apply a decoded transaction
    pub fn check_decoded(&self, tx: &DecodedTransaction) -> ResultCode {
        let mut view = self.check.lock();

        if let Err(code) = validate(&view, tx) {
            tracing::debug!(
                "check_tx: rejected {} from {} (nonce {}): {}",
                tx.hash,
                tx.sender,
                tx.nonce,
                code
            );
            return code;
        }

        match self.engine.apply_transaction(&view, tx) {
            Ok((next, _receipt)) => {
                *view = next;
                tracing::debug!(
                    "check_tx: admitted {} from {} (nonce {})",
                    tx.hash,
                    tx.sender,
                    tx.nonce
                );
                ResultCode::Ok
            }
            Err(code) => {
                tracing::debug!("check_tx: engine rejected {}: {}", tx.hash, code);
                code
            }
        }
    }

    /// Next nonce the pool expects from `address`
    pub fn pending_nonce(&self, address: &Address) -> u64 {
        self.check.lock().nonce(address)
    }

    /// Account as seen by the pool, including speculative admissions
    pub fn pending_account(&self, address: &Address) -> Account {
        self.check.lock().account(address)
    }

    pub fn codec(&self) -> &TransactionCodec {
        &self.codec
    }
}
