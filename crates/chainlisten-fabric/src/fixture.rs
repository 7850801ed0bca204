//! Builders that encode Fabric blocks from plain write-sets.
//!
//! Used to produce replay files for [`DirectoryBlockSource`] and blocks for
//! tests.
//!
//! ```
//! use chainlisten_fabric::fixture::{ActionFixture, BlockFixture, TxFixture};
//!
//! let block = BlockFixture::new(5)
//!     .tx(TxFixture::endorser("tx-1")
//!         .action(ActionFixture::new("assets", &["put", "car1", "red"])
//!             .write("assets", "car1", "red")))
//!     .build();
//! assert_eq!(block.number(), Some(5));
//! ```
//!
//! [`DirectoryBlockSource`]: crate::source::DirectoryBlockSource

use prost::Message;

use crate::proto::common::{self, Block, BlockMetadataIndex, HeaderType};
use crate::proto::peer::{self, TX_VALIDATION_VALID};
use crate::proto::rwset::{self, kvrwset};

/// Channel header timestamp stamped on every fixture transaction.
pub const FIXTURE_TIMESTAMP_SECS: i64 = 1_554_000_000;

/// `TxValidationCode.MVCC_READ_CONFLICT`
pub const MVCC_READ_CONFLICT: u8 = 11;

/// One chaincode action: invocation input plus its write-set.
#[derive(Debug, Clone, Default)]
pub struct ActionFixture {
    chaincode: String,
    args: Vec<Vec<u8>>,
    groups: Vec<(String, Vec<kvrwset::KvWrite>)>,
}

impl ActionFixture {
    pub fn new(chaincode: impl Into<String>, args: &[&str]) -> Self {
        Self {
            chaincode: chaincode.into(),
            args: args.iter().map(|a| a.as_bytes().to_vec()).collect(),
            groups: Vec::new(),
        }
    }

    pub fn write(self, namespace: &str, key: &str, value: &str) -> Self {
        self.push(namespace, kvrwset::KvWrite {
            key: key.to_string(),
            is_delete: false,
            value: value.as_bytes().to_vec(),
        })
    }

    pub fn delete(self, namespace: &str, key: &str) -> Self {
        self.push(namespace, kvrwset::KvWrite {
            key: key.to_string(),
            is_delete: true,
            value: Vec::new(),
        })
    }

    fn push(mut self, namespace: &str, write: kvrwset::KvWrite) -> Self {
        match self.groups.iter_mut().find(|(ns, _)| ns == namespace) {
            Some((_, writes)) => writes.push(write),
            None => self.groups.push((namespace.to_string(), vec![write])),
        }
        self
    }

    /// Encoded `ChaincodeActionPayload`.
    pub fn encode(&self) -> Vec<u8> {
        let cc_id = peer::ChaincodeId {
            name: self.chaincode.clone(),
            ..Default::default()
        };
        let cis = peer::ChaincodeInvocationSpec {
            chaincode_spec: Some(peer::ChaincodeSpec {
                r#type: 1,
                chaincode_id: Some(cc_id.clone()),
                input: Some(peer::ChaincodeInput {
                    args: self.args.clone(),
                    is_init: false,
                }),
                timeout: 0,
            }),
        };
        let cpp = peer::ChaincodeProposalPayload {
            input: cis.encode_to_vec(),
        };

        let tx_rwset = rwset::TxReadWriteSet {
            data_model: 0,
            ns_rwset: self
                .groups
                .iter()
                .map(|(ns, writes)| rwset::NsReadWriteSet {
                    namespace: ns.clone(),
                    rwset: kvrwset::KvrwSet {
                        writes: writes.clone(),
                    }
                    .encode_to_vec(),
                })
                .collect(),
        };
        let cc_action = peer::ChaincodeAction {
            results: tx_rwset.encode_to_vec(),
            events: Vec::new(),
            chaincode_id: Some(cc_id),
        };
        let prp = peer::ProposalResponsePayload {
            proposal_hash: Vec::new(),
            extension: cc_action.encode_to_vec(),
        };

        peer::ChaincodeActionPayload {
            chaincode_proposal_payload: cpp.encode_to_vec(),
            action: Some(peer::ChaincodeEndorsedAction {
                proposal_response_payload: prp.encode_to_vec(),
            }),
        }
        .encode_to_vec()
    }
}

/// One transaction envelope.
#[derive(Debug, Clone)]
pub struct TxFixture {
    tx_id: String,
    header_type: HeaderType,
    actions: Vec<Vec<u8>>,
}

impl TxFixture {
    pub fn endorser(tx_id: impl Into<String>) -> Self {
        Self {
            tx_id: tx_id.into(),
            header_type: HeaderType::EndorserTransaction,
            actions: Vec::new(),
        }
    }

    /// A config transaction; carries no actions.
    pub fn config(tx_id: impl Into<String>) -> Self {
        Self {
            tx_id: tx_id.into(),
            header_type: HeaderType::Config,
            actions: Vec::new(),
        }
    }

    pub fn action(mut self, action: ActionFixture) -> Self {
        self.actions.push(action.encode());
        self
    }

    /// An action whose payload is taken verbatim.
    pub fn raw_action(mut self, payload: Vec<u8>) -> Self {
        self.actions.push(payload);
        self
    }

    /// Encoded `Envelope`.
    pub fn encode(&self, channel_id: &str) -> Vec<u8> {
        let chdr = common::ChannelHeader {
            r#type: self.header_type as i32,
            version: 0,
            timestamp: Some(prost_types::Timestamp {
                seconds: FIXTURE_TIMESTAMP_SECS,
                nanos: 0,
            }),
            channel_id: channel_id.to_string(),
            tx_id: self.tx_id.clone(),
            epoch: 0,
            extension: Vec::new(),
            tls_cert_hash: Vec::new(),
        };
        let transaction = peer::Transaction {
            actions: self
                .actions
                .iter()
                .map(|payload| peer::TransactionAction {
                    header: Vec::new(),
                    payload: payload.clone(),
                })
                .collect(),
        };
        let payload = common::Payload {
            header: Some(common::Header {
                channel_header: chdr.encode_to_vec(),
                signature_header: Vec::new(),
            }),
            data: transaction.encode_to_vec(),
        };
        common::Envelope {
            payload: payload.encode_to_vec(),
            signature: Vec::new(),
        }
        .encode_to_vec()
    }
}

/// A block under construction.
#[derive(Debug, Clone)]
pub struct BlockFixture {
    number: u64,
    channel_id: String,
    envelopes: Vec<Vec<u8>>,
    filter: Vec<u8>,
}

impl BlockFixture {
    pub fn new(number: u64) -> Self {
        Self {
            number,
            channel_id: "mychannel".into(),
            envelopes: Vec::new(),
            filter: Vec::new(),
        }
    }

    pub fn channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = channel_id.into();
        self
    }

    /// Append a valid transaction.
    pub fn tx(self, tx: TxFixture) -> Self {
        self.invalid_tx(tx, TX_VALIDATION_VALID)
    }

    /// Append a transaction with the given validation code.
    pub fn invalid_tx(mut self, tx: TxFixture, code: u8) -> Self {
        self.envelopes.push(tx.encode(&self.channel_id));
        self.filter.push(code);
        self
    }

    /// Append raw envelope bytes, flagged valid.
    pub fn raw_tx(mut self, envelope: Vec<u8>) -> Self {
        self.envelopes.push(envelope);
        self.filter.push(TX_VALIDATION_VALID);
        self
    }

    pub fn build(self) -> Block {
        let mut metadata = vec![Vec::new(); BlockMetadataIndex::CommitHash as usize + 1];
        metadata[BlockMetadataIndex::TransactionsFilter as usize] = self.filter;
        Block {
            header: Some(common::BlockHeader {
                number: self.number,
                previous_hash: Vec::new(),
                data_hash: Vec::new(),
            }),
            data: Some(common::BlockData {
                data: self.envelopes,
            }),
            metadata: Some(common::BlockMetadata { metadata }),
        }
    }

    /// Wire bytes, as written by `peer channel fetch`.
    pub fn encode(self) -> Vec<u8> {
        self.build().encode_to_vec()
    }
}
