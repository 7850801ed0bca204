//! Block extractor. Turns one Fabric block into namespace-scoped write
//! records.
//!
//! The walk is `Block → Envelope → Payload → ChannelHeader → Transaction →
//! TransactionAction → ChaincodeActionPayload → {ChaincodeInvocationSpec,
//! ProposalResponsePayload → ChaincodeAction → TxReadWriteSet → KVRWSet}`.
//!
//! Transactions marked invalid in the block's `TRANSACTIONS_FILTER` are
//! skipped, as are non-endorser transactions and writes under the system
//! chaincodes. A decode failure drops only the transaction or action it
//! occurred in; the rest of the block is still extracted. Extraction is a
//! pure function of the block, so re-delivered blocks yield identical output.

use chrono::{DateTime, Utc};
use prost::Message;

use chainlisten_core::types::{is_system_namespace, BlockWrites, ChaincodeArgs, Invocation, WriteRecord};

use crate::error::{DecodeError, ExtractError};
use crate::proto::common::{self, Block, HeaderType};
use crate::proto::peer::{self, TX_VALIDATION_VALID};
use crate::proto::rwset::{self, kvrwset};

/// Counters for one extracted block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub transactions: usize,
    pub invalid: usize,
    pub non_endorser: usize,
    pub failed_transactions: usize,
    pub failed_actions: usize,
}

/// Stateless extractor bound to a channel id.
#[derive(Debug, Clone)]
pub struct BlockExtractor {
    channel_id: String,
}

/// A transaction that passed the header checks.
struct EndorserTx {
    tx_id: String,
    timestamp: Option<DateTime<Utc>>,
    transaction: peer::Transaction,
}

impl BlockExtractor {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Extract all business writes from `block`.
    pub fn extract(&self, block: &Block) -> Result<BlockWrites, ExtractError> {
        self.extract_with_stats(block).map(|(writes, _)| writes)
    }

    /// Like [`extract`](Self::extract), also returning skip/failure counters.
    pub fn extract_with_stats(
        &self,
        block: &Block,
    ) -> Result<(BlockWrites, ExtractStats), ExtractError> {
        let number = block.number().ok_or(ExtractError::MissingHeader)?;
        let filter = block.transactions_filter();
        let envelopes = block.envelopes();

        let mut out = BlockWrites::new(&self.channel_id, number);
        let mut stats = ExtractStats {
            transactions: envelopes.len(),
            ..Default::default()
        };

        for (tx_index, env_bytes) in envelopes.iter().enumerate() {
            if is_invalid(filter, tx_index) {
                tracing::debug!(
                    channel = %self.channel_id,
                    block = number,
                    tx_index,
                    code = filter[tx_index],
                    "skipping invalid transaction"
                );
                stats.invalid += 1;
                continue;
            }

            let tx = match decode_transaction(env_bytes) {
                Ok(Some(tx)) => tx,
                Ok(None) => {
                    tracing::debug!(
                        channel = %self.channel_id,
                        block = number,
                        tx_index,
                        "skipping transaction since it is not an endorsement transaction"
                    );
                    stats.non_endorser += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!(
                        channel = %self.channel_id,
                        block = number,
                        tx_index,
                        error = %e,
                        "skipping undecodable transaction"
                    );
                    stats.failed_transactions += 1;
                    continue;
                }
            };

            if out.timestamp.is_none() {
                out.timestamp = tx.timestamp;
            }

            for (action_index, action) in tx.transaction.actions.iter().enumerate() {
                match decode_action(action) {
                    Ok((spec, groups)) => {
                        let namespace = spec
                            .chaincode_id
                            .as_ref()
                            .map(|id| id.name.clone())
                            .unwrap_or_default();
                        let args = spec
                            .input
                            .map(|input| ChaincodeArgs::from_raw(input.args))
                            .unwrap_or_default();
                        tracing::debug!(
                            channel = %self.channel_id,
                            block = number,
                            tx = %tx.tx_id,
                            chaincode = %namespace,
                            input = %args,
                            "chaincode invocation"
                        );
                        if !is_system_namespace(&namespace) {
                            out.invocations.push(Invocation {
                                tx_index,
                                tx_id: tx.tx_id.clone(),
                                namespace,
                                args,
                            });
                        }

                        for (ns, writes) in groups {
                            if is_system_namespace(&ns) {
                                continue;
                            }
                            out.records.extend(writes.into_iter().map(|w| WriteRecord {
                                tx_index,
                                tx_id: tx.tx_id.clone(),
                                namespace: ns.clone(),
                                key: w.key,
                                value: w.value,
                                is_delete: w.is_delete,
                            }));
                        }
                    }
                    Err(e) => {
                        tracing::error!(
                            channel = %self.channel_id,
                            block = number,
                            tx = %tx.tx_id,
                            action_index,
                            error = %e,
                            "skipping undecodable action"
                        );
                        stats.failed_actions += 1;
                    }
                }
            }
        }

        tracing::debug!(
            channel = %self.channel_id,
            block = number,
            records = out.records.len(),
            ?stats,
            "extracted block"
        );
        Ok((out, stats))
    }
}

/// A position past the end of the filter is treated as valid.
fn is_invalid(filter: &[u8], tx_index: usize) -> bool {
    filter
        .get(tx_index)
        .is_some_and(|&code| code != TX_VALIDATION_VALID)
}

/// Decode an envelope down to its transaction. Returns `Ok(None)` for
/// non-endorser transactions (config updates and the like).
fn decode_transaction(env_bytes: &[u8]) -> Result<Option<EndorserTx>, DecodeError> {
    let envelope = common::Envelope::decode(env_bytes).map_err(DecodeError::at("envelope"))?;
    let payload =
        common::Payload::decode(envelope.payload.as_slice()).map_err(DecodeError::at("payload"))?;
    let header = payload.header.ok_or(DecodeError::Missing("payload header"))?;
    let chdr = common::ChannelHeader::decode(header.channel_header.as_slice())
        .map_err(DecodeError::at("channel header"))?;

    if chdr.r#type != HeaderType::EndorserTransaction as i32 {
        return Ok(None);
    }

    let transaction = peer::Transaction::decode(payload.data.as_slice())
        .map_err(DecodeError::at("transaction"))?;
    let timestamp = chdr
        .timestamp
        .and_then(|ts| DateTime::from_timestamp(ts.seconds, ts.nanos.max(0) as u32));

    Ok(Some(EndorserTx {
        tx_id: chdr.tx_id,
        timestamp,
        transaction,
    }))
}

/// Decode one action into its invocation spec and `(namespace, writes)` groups.
fn decode_action(
    action: &peer::TransactionAction,
) -> Result<(peer::ChaincodeSpec, Vec<(String, Vec<kvrwset::KvWrite>)>), DecodeError> {
    let cap = peer::ChaincodeActionPayload::decode(action.payload.as_slice())
        .map_err(DecodeError::at("chaincode action payload"))?;

    let cpp = peer::ChaincodeProposalPayload::decode(cap.chaincode_proposal_payload.as_slice())
        .map_err(DecodeError::at("chaincode proposal payload"))?;
    let cis = peer::ChaincodeInvocationSpec::decode(cpp.input.as_slice())
        .map_err(DecodeError::at("chaincode invocation spec"))?;
    let spec = cis.chaincode_spec.ok_or(DecodeError::Missing("chaincode spec"))?;

    let endorsed = cap.action.ok_or(DecodeError::Missing("endorsed action"))?;
    let prp = peer::ProposalResponsePayload::decode(endorsed.proposal_response_payload.as_slice())
        .map_err(DecodeError::at("proposal response payload"))?;
    let cc_action = peer::ChaincodeAction::decode(prp.extension.as_slice())
        .map_err(DecodeError::at("chaincode action"))?;
    let tx_rwset = rwset::TxReadWriteSet::decode(cc_action.results.as_slice())
        .map_err(DecodeError::at("read-write set"))?;

    let groups = tx_rwset
        .ns_rwset
        .into_iter()
        .map(|ns| {
            let kv = kvrwset::KvrwSet::decode(ns.rwset.as_slice())
                .map_err(DecodeError::at("kv read-write set"))?;
            Ok((ns.namespace, kv.writes))
        })
        .collect::<Result<Vec<_>, DecodeError>>()?;

    Ok((spec, groups))
}
