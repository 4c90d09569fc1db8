//! Block execution
//!
//! A [`PendingBlock`] holds the deliver view and the receipts of the block
//! currently open. It is owned by the lifecycle controller and only ever
//! touched from the serialised consensus path.

use crate::validation::validate;
use bft_ledger::{EngineError, ExecutionEngine, StateView};
use bft_types::{HeaderContext, Receipt, ResultCode, TransactionCodec, H256};
use std::sync::Arc;

/// The open block: header, deliver view and accumulated receipts
#[derive(Debug, Clone)]
pub struct PendingBlock {
    header: HeaderContext,
    view: StateView,
    receipts: Vec<Receipt>,
}

impl PendingBlock {
    pub fn header(&self) -> &HeaderContext {
        &self.header
    }

    pub fn view(&self) -> &StateView {
        &self.view
    }

    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }

    fn accept(&mut self, view: StateView, mut receipt: Receipt) {
        receipt.index = self.receipts.len() as u32;
        self.view = view;
        self.receipts.push(receipt);
    }
}

/// Applies consensus-ordered transactions to the deliver view
pub struct BlockExecutor<E> {
    engine: Arc<E>,
    codec: TransactionCodec,
}

impl<E: ExecutionEngine> BlockExecutor<E> {
    pub fn new(engine: Arc<E>, codec: TransactionCodec) -> Self {
        Self { engine, codec }
    }

    /// Open a block on top of the committed state at `root`
    pub fn begin(&self, header: HeaderContext, root: H256) -> Result<PendingBlock, EngineError> {
        Ok(PendingBlock {
            header,
            view: self.engine.derive_view(root)?,
            receipts: Vec::new(),
        })
    }

    /// Decode, validate and apply one transaction to the open block
    ///
    /// A rejection leaves the block exactly as it was.
    pub fn deliver(&self, block: &mut PendingBlock, raw: &[u8]) -> ResultCode {
        let tx = match self.codec.decode(raw) {
            Ok(tx) => tx,
            Err(e) => {
                tracing::warn!(
                    "deliver_tx at height {}: undecodable transaction: {}",
                    block.header.height,
                    e
                );
                return e.into();
            }
        };

        if let Err(code) = validate(&block.view, &tx) {
            tracing::warn!(
                "deliver_tx at height {}: rejected {} from {} (nonce {}): {}",
                block.header.height,
                tx.hash,
                tx.sender,
                tx.nonce,
                code
            );
            return code;
        }

        match self.engine.apply_transaction(&block.view, &tx) {
            Ok((view, receipt)) => {
                block.accept(view, receipt);
                ResultCode::Ok
            }
            Err(code) => {
                tracing::warn!(
                    "deliver_tx at height {}: engine rejected {}: {}",
                    block.header.height,
                    tx.hash,
                    code
                );
                code
            }
        }
    }
}
