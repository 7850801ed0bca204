//! Fabric protobuf wire types, limited to the messages and fields the
//! extractor reads.
//!
//! Field tags follow `fabric-protos` (`common/common.proto`,
//! `peer/transaction.proto`, `peer/proposal.proto`,
//! `peer/proposal_response.proto`, `peer/chaincode.proto`,
//! `ledger/rwset/rwset.proto`, `ledger/rwset/kvrwset/kv_rwset.proto`).
//! Unknown fields are skipped by prost, so newer peers decode fine.

pub mod common {
    /// Slots of `BlockMetadata.metadata`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum BlockMetadataIndex {
        Signatures = 0,
        LastConfig = 1,
        TransactionsFilter = 2,
        Orderer = 3,
        CommitHash = 4,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum HeaderType {
        Message = 0,
        Config = 1,
        ConfigUpdate = 2,
        EndorserTransaction = 3,
        OrdererTransaction = 4,
        DeliverSeekInfo = 5,
        ChaincodePackage = 6,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Block {
        #[prost(message, optional, tag = "1")]
        pub header: ::core::option::Option<BlockHeader>,
        #[prost(message, optional, tag = "2")]
        pub data: ::core::option::Option<BlockData>,
        #[prost(message, optional, tag = "3")]
        pub metadata: ::core::option::Option<BlockMetadata>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BlockHeader {
        #[prost(uint64, tag = "1")]
        pub number: u64,
        #[prost(bytes = "vec", tag = "2")]
        pub previous_hash: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "3")]
        pub data_hash: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BlockData {
        #[prost(bytes = "vec", repeated, tag = "1")]
        pub data: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BlockMetadata {
        #[prost(bytes = "vec", repeated, tag = "1")]
        pub metadata: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Envelope {
        #[prost(bytes = "vec", tag = "1")]
        pub payload: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "2")]
        pub signature: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Payload {
        #[prost(message, optional, tag = "1")]
        pub header: ::core::option::Option<Header>,
        #[prost(bytes = "vec", tag = "2")]
        pub data: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Header {
        #[prost(bytes = "vec", tag = "1")]
        pub channel_header: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "2")]
        pub signature_header: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ChannelHeader {
        #[prost(int32, tag = "1")]
        pub r#type: i32,
        #[prost(int32, tag = "2")]
        pub version: i32,
        #[prost(message, optional, tag = "3")]
        pub timestamp: ::core::option::Option<::prost_types::Timestamp>,
        #[prost(string, tag = "4")]
        pub channel_id: ::prost::alloc::string::String,
        #[prost(string, tag = "5")]
        pub tx_id: ::prost::alloc::string::String,
        #[prost(uint64, tag = "6")]
        pub epoch: u64,
        #[prost(bytes = "vec", tag = "7")]
        pub extension: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "8")]
        pub tls_cert_hash: ::prost::alloc::vec::Vec<u8>,
    }
}

pub mod peer {
    /// `TxValidationCode.VALID`; every other code marks the transaction invalid.
    pub const TX_VALIDATION_VALID: u8 = 0;

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Transaction {
        #[prost(message, repeated, tag = "1")]
        pub actions: ::prost::alloc::vec::Vec<TransactionAction>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TransactionAction {
        #[prost(bytes = "vec", tag = "1")]
        pub header: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "2")]
        pub payload: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ChaincodeActionPayload {
        #[prost(bytes = "vec", tag = "1")]
        pub chaincode_proposal_payload: ::prost::alloc::vec::Vec<u8>,
        #[prost(message, optional, tag = "2")]
        pub action: ::core::option::Option<ChaincodeEndorsedAction>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ChaincodeEndorsedAction {
        #[prost(bytes = "vec", tag = "1")]
        pub proposal_response_payload: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ProposalResponsePayload {
        #[prost(bytes = "vec", tag = "1")]
        pub proposal_hash: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "2")]
        pub extension: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ChaincodeAction {
        #[prost(bytes = "vec", tag = "1")]
        pub results: ::prost::alloc::vec::Vec<u8>,
        #[prost(bytes = "vec", tag = "2")]
        pub events: ::prost::alloc::vec::Vec<u8>,
        #[prost(message, optional, tag = "4")]
        pub chaincode_id: ::core::option::Option<ChaincodeId>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ChaincodeProposalPayload {
        #[prost(bytes = "vec", tag = "1")]
        pub input: ::prost::alloc::vec::Vec<u8>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ChaincodeInvocationSpec {
        #[prost(message, optional, tag = "1")]
        pub chaincode_spec: ::core::option::Option<ChaincodeSpec>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ChaincodeSpec {
        #[prost(int32, tag = "1")]
        pub r#type: i32,
        #[prost(message, optional, tag = "2")]
        pub chaincode_id: ::core::option::Option<ChaincodeId>,
        #[prost(message, optional, tag = "3")]
        pub input: ::core::option::Option<ChaincodeInput>,
        #[prost(int32, tag = "4")]
        pub timeout: i32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ChaincodeId {
        #[prost(string, tag = "1")]
        pub path: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub name: ::prost::alloc::string::String,
        #[prost(string, tag = "3")]
        pub version: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ChaincodeInput {
        #[prost(bytes = "vec", repeated, tag = "1")]
        pub args: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
        #[prost(bool, tag = "3")]
        pub is_init: bool,
    }
}

pub mod rwset {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TxReadWriteSet {
        #[prost(int32, tag = "1")]
        pub data_model: i32,
        #[prost(message, repeated, tag = "2")]
        pub ns_rwset: ::prost::alloc::vec::Vec<NsReadWriteSet>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NsReadWriteSet {
        #[prost(string, tag = "1")]
        pub namespace: ::prost::alloc::string::String,
        #[prost(bytes = "vec", tag = "2")]
        pub rwset: ::prost::alloc::vec::Vec<u8>,
    }

    pub mod kvrwset {
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct KvrwSet {
            #[prost(message, repeated, tag = "3")]
            pub writes: ::prost::alloc::vec::Vec<KvWrite>,
        }

        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct KvWrite {
            #[prost(string, tag = "1")]
            pub key: ::prost::alloc::string::String,
            #[prost(bool, tag = "2")]
            pub is_delete: bool,
            #[prost(bytes = "vec", tag = "3")]
            pub value: ::prost::alloc::vec::Vec<u8>,
        }
    }
}

pub use common::Block;

impl Block {
    /// Header number, if the block has a header.
    pub fn number(&self) -> Option<u64> {
        self.header.as_ref().map(|h| h.number)
    }

    /// Transaction envelopes in block order.
    pub fn envelopes(&self) -> &[Vec<u8>] {
        self.data.as_ref().map(|d| d.data.as_slice()).unwrap_or(&[])
    }

    /// The `TRANSACTIONS_FILTER` metadata slot: one validation code per transaction.
    pub fn transactions_filter(&self) -> &[u8] {
        self.metadata
            .as_ref()
            .and_then(|m| m.metadata.get(common::BlockMetadataIndex::TransactionsFilter as usize))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
