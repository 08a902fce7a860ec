//! Bounded wire messages exchanged between peers.
//!
//! Every message type comes in two flavours: the generated protobuf type in
//! [crate::proto] and a validated domain type defined here. Decoding goes
//! bytes -> protobuf -> domain type, and only the domain type is handed to
//! the rest of the node. Every declared bound is checked on the way in, a
//! message violating any of them is rejected in its entirety.

use crate::*;
use bytes::Bytes;
use prost::Message;

/// Max number of requests in a [RequestBatch].
pub const MAX_BATCH_REQUESTS: usize = 100;

/// Max number of responses in a [ResponseBatch].
pub const MAX_BATCH_RESPONSES: usize = 100;

/// Max size of a single artifact, 85 MiB.
pub const MAX_DATA_LEN: usize = 89_128_960;

/// Max number of hashes in [MeshHashes].
pub const MAX_MESH_HASHES: usize = 1000;

/// Max number of node ids in [MaliciousIds].
pub const MAX_MALICIOUS_IDS: usize = 100_000;

/// Max number of activation ids in [EpochData].
pub const MAX_EPOCH_ATXS: usize = 2_200_000;

/// Max number of ballots in [LayerData].
///
/// With 2.2 Mio activations plus one identity holding all 50 slots of every
/// layer, a layer is expected to hold ~596 ballots with a standard deviation
/// of ~24.4. 800 leaves more than 6 sigma of headroom.
pub const MAX_LAYER_BALLOTS: usize = 800;

// Generous upper bound of protobuf framing (tag + length varints) around a
// single field or nested message.
const FIELD_OVERHEAD: usize = 16;

// Upper bound of an encoded identifier field.
const ID_FIELD_LEN: usize = ID_LEN + FIELD_OVERHEAD;

/// Reject `observed` if it exceeds `max`.
pub fn check_bound(
    field: &'static str,
    max: usize,
    observed: usize,
) -> MsResult<()> {
    if observed > max {
        return Err(MsError::bad_request(Violation::ExceedsBound {
            field,
            max,
            observed,
        }));
    }
    Ok(())
}

/// A message that can be sent over the wire.
pub trait WireMessage: Sized {
    /// The generated protobuf type.
    type Proto: Message + Default;

    /// Name of the message, used when reporting violations.
    const NAME: &'static str;

    /// Upper bound of the encoded size implied by the field bounds.
    /// Larger payloads are rejected before protobuf decoding.
    const MAX_ENCODED_LEN: usize;

    /// Convert to the protobuf representation.
    fn to_proto(&self) -> Self::Proto;

    /// Convert from the protobuf representation, validating everything.
    fn from_proto(proto: Self::Proto) -> MsResult<Self>;

    /// Check bounds and invariants of an already constructed value.
    fn validate(&self) -> MsResult<()> {
        Ok(())
    }

    /// Encode to bytes.
    fn encode(&self) -> Bytes {
        debug_assert!(
            self.validate().is_ok(),
            "refusing to encode out-of-bound {}",
            Self::NAME
        );
        let out = self.to_proto().encode_to_vec();
        debug_assert!(out.len() <= Self::MAX_ENCODED_LEN);
        out.into()
    }

    /// Decode from bytes, enforcing every bound.
    fn decode(data: Bytes) -> MsResult<Self> {
        check_bound(Self::NAME, Self::MAX_ENCODED_LEN, data.len())?;
        let proto = Self::Proto::decode(data).map_err(|err| {
            tracing::trace!("could not decode {}: {err}", Self::NAME);
            MsError::bad_request(Violation::Malformed { field: Self::NAME })
        })?;
        Self::from_proto(proto)
    }
}

/// Kind of artifact a content hash refers to.
///
/// Tells the answering peer which store to consult.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Hint {
    /// A ballot.
    Ballot,
    /// A block.
    Block,
    /// A proposal.
    Proposal,
    /// An activation record.
    Atx,
    /// A transaction.
    Tx,
    /// A proof of elapsed time.
    Poet,
    /// A malfeasance proof.
    Malfeasance,
    /// An epoch active set.
    ActiveSet,
}

impl Hint {
    /// All hints.
    pub const ALL: [Hint; 8] = [
        Hint::Ballot,
        Hint::Block,
        Hint::Proposal,
        Hint::Atx,
        Hint::Tx,
        Hint::Poet,
        Hint::Malfeasance,
        Hint::ActiveSet,
    ];

    /// Short name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Hint::Ballot => "ballot",
            Hint::Block => "block",
            Hint::Proposal => "proposal",
            Hint::Atx => "atx",
            Hint::Tx => "tx",
            Hint::Poet => "poet",
            Hint::Malfeasance => "malfeasance",
            Hint::ActiveSet => "activeset",
        }
    }

    fn to_proto(self) -> proto::Hint {
        match self {
            Hint::Ballot => proto::Hint::Ballot,
            Hint::Block => proto::Hint::Block,
            Hint::Proposal => proto::Hint::Proposal,
            Hint::Atx => proto::Hint::Atx,
            Hint::Tx => proto::Hint::Tx,
            Hint::Poet => proto::Hint::Poet,
            Hint::Malfeasance => proto::Hint::Malfeasance,
            Hint::ActiveSet => proto::Hint::ActiveSet,
        }
    }

    /// Parse the wire value of a hint.
    pub fn from_wire(value: i32) -> MsResult<Self> {
        let unknown = || {
            MsError::bad_request(Violation::Unknown {
                field: "hint",
                value: value as i64,
            })
        };
        match proto::Hint::try_from(value).map_err(|_| unknown())? {
            proto::Hint::Unspecified => Err(unknown()),
            proto::Hint::Ballot => Ok(Hint::Ballot),
            proto::Hint::Block => Ok(Hint::Block),
            proto::Hint::Proposal => Ok(Hint::Proposal),
            proto::Hint::Atx => Ok(Hint::Atx),
            proto::Hint::Tx => Ok(Hint::Tx),
            proto::Hint::Poet => Ok(Hint::Poet),
            proto::Hint::Malfeasance => Ok(Hint::Malfeasance),
            proto::Hint::ActiveSet => Ok(Hint::ActiveSet),
        }
    }

    /// The wire value of this hint.
    pub fn to_wire(self) -> i32 {
        self.to_proto().into()
    }
}

impl std::fmt::Display for Hint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Please send me the artifact with this hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestMessage {
    /// What kind of artifact the hash refers to.
    pub hint: Hint,
    /// The requested content hash.
    pub hash: ContentHash,
}

impl RequestMessage {
    fn to_proto(self) -> proto::RequestMessage {
        proto::RequestMessage {
            hint: self.hint.to_wire(),
            hash: self.hash.to_bytes(),
        }
    }

    fn from_proto(proto: proto::RequestMessage) -> MsResult<Self> {
        Ok(Self {
            hint: Hint::from_wire(proto.hint)?,
            hash: ContentHash::from_wire("hash", &proto.hash)?,
        })
    }
}

/// An artifact sent in response to a [RequestMessage].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseMessage {
    hash: ContentHash,
    data: Bytes,
}

impl ResponseMessage {
    /// Construct a new response message, the data must not exceed
    /// [MAX_DATA_LEN].
    pub fn new(hash: ContentHash, data: Bytes) -> MsResult<Self> {
        check_bound("data", MAX_DATA_LEN, data.len())?;
        Ok(Self { hash, data })
    }

    /// The hash this response answers.
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    /// The artifact bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Take the artifact bytes.
    pub fn into_data(self) -> Bytes {
        self.data
    }

    fn to_proto(&self) -> proto::ResponseMessage {
        proto::ResponseMessage {
            hash: self.hash.to_bytes(),
            data: self.data.clone(),
        }
    }

    fn from_proto(proto: proto::ResponseMessage) -> MsResult<Self> {
        Self::new(ContentHash::from_wire("hash", &proto.hash)?, proto.data)
    }
}

/// Identifies a [RequestBatch] and its matching [ResponseBatch].
pub type BatchId = ContentHash;

/// A batch of requests, identified by a hash of its contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestBatch {
    id: BatchId,
    requests: Vec<RequestMessage>,
}

impl RequestBatch {
    /// Construct a batch, deriving its id from the requests.
    pub fn new(requests: Vec<RequestMessage>) -> MsResult<Self> {
        check_bound("requests", MAX_BATCH_REQUESTS, requests.len())?;
        Ok(Self {
            id: Self::derive_id(&requests),
            requests,
        })
    }

    /// The deterministic id of a list of requests: the SHA-256 over each
    /// request's hint wire value (big-endian) followed by its hash.
    pub fn derive_id(requests: &[RequestMessage]) -> BatchId {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        for request in requests {
            hasher.update(request.hint.to_wire().to_be_bytes());
            hasher.update(request.hash.0);
        }
        ContentHash(hasher.finalize().into())
    }

    /// The batch id.
    pub fn id(&self) -> &BatchId {
        &self.id
    }

    /// The requests in this batch.
    pub fn requests(&self) -> &[RequestMessage] {
        &self.requests
    }
}

impl WireMessage for RequestBatch {
    type Proto = proto::RequestBatch;
    const NAME: &'static str = "RequestBatch";
    const MAX_ENCODED_LEN: usize = ID_FIELD_LEN
        + MAX_BATCH_REQUESTS * (ID_FIELD_LEN + 2 * FIELD_OVERHEAD);

    fn to_proto(&self) -> Self::Proto {
        proto::RequestBatch {
            id: self.id.to_bytes(),
            requests: self
                .requests
                .iter()
                .map(|r| r.to_proto())
                .collect(),
        }
    }

    fn from_proto(proto: Self::Proto) -> MsResult<Self> {
        check_bound("requests", MAX_BATCH_REQUESTS, proto.requests.len())?;
        Ok(Self {
            id: ContentHash::from_wire("id", &proto.id)?,
            requests: proto
                .requests
                .into_iter()
                .map(RequestMessage::from_proto)
                .collect::<MsResult<_>>()?,
        })
    }

    fn validate(&self) -> MsResult<()> {
        check_bound("requests", MAX_BATCH_REQUESTS, self.requests.len())
    }
}

/// The answer to a [RequestBatch].
///
/// The id must match the request batch even when the peer lacks some of
/// the requested artifacts, those are simply absent from the responses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseBatch {
    id: BatchId,
    responses: Vec<ResponseMessage>,
}

impl ResponseBatch {
    /// Construct a response batch.
    pub fn new(id: BatchId, responses: Vec<ResponseMessage>) -> MsResult<Self> {
        check_bound("responses", MAX_BATCH_RESPONSES, responses.len())?;
        Ok(Self { id, responses })
    }

    /// The id of the request batch this answers.
    pub fn id(&self) -> &BatchId {
        &self.id
    }

    /// The responses in this batch.
    pub fn responses(&self) -> &[ResponseMessage] {
        &self.responses
    }

    /// Take the responses.
    pub fn into_responses(self) -> Vec<ResponseMessage> {
        self.responses
    }
}

impl WireMessage for ResponseBatch {
    type Proto = proto::ResponseBatch;
    const NAME: &'static str = "ResponseBatch";
    const MAX_ENCODED_LEN: usize = MAX_BATCH_RESPONSES
        .saturating_mul(MAX_DATA_LEN + ID_FIELD_LEN + 2 * FIELD_OVERHEAD)
        .saturating_add(ID_FIELD_LEN);

    fn to_proto(&self) -> Self::Proto {
        proto::ResponseBatch {
            id: self.id.to_bytes(),
            responses: self
                .responses
                .iter()
                .map(ResponseMessage::to_proto)
                .collect(),
        }
    }

    fn from_proto(proto: Self::Proto) -> MsResult<Self> {
        check_bound(
            "responses",
            MAX_BATCH_RESPONSES,
            proto.responses.len(),
        )?;
        Ok(Self {
            id: ContentHash::from_wire("id", &proto.id)?,
            responses: proto
                .responses
                .into_iter()
                .map(ResponseMessage::from_proto)
                .collect::<MsResult<_>>()?,
        })
    }

    fn validate(&self) -> MsResult<()> {
        check_bound("responses", MAX_BATCH_RESPONSES, self.responses.len())?;
        for response in &self.responses {
            check_bound("data", MAX_DATA_LEN, response.data.len())?;
        }
        Ok(())
    }
}

/// Defines a bounded list of identifiers message.
macro_rules! id_list {
    (
        $(#[$meta:meta])*
        $name:ident, $proto:path, $field:ident, $item:ty, $max:expr
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Eq)]
        pub struct $name {
            $field: Vec<$item>,
        }

        impl $name {
            /// Construct a new bounded list.
            pub fn new($field: Vec<$item>) -> MsResult<Self> {
                check_bound(stringify!($field), $max, $field.len())?;
                Ok(Self { $field })
            }

            /// The listed identifiers.
            pub fn $field(&self) -> &[$item] {
                &self.$field
            }

            /// Take the listed identifiers.
            pub fn into_inner(self) -> Vec<$item> {
                self.$field
            }
        }

        impl WireMessage for $name {
            type Proto = $proto;
            const NAME: &'static str = stringify!($name);
            const MAX_ENCODED_LEN: usize = $max * ID_FIELD_LEN;

            fn to_proto(&self) -> Self::Proto {
                $proto {
                    $field: self.$field.iter().map(|i| i.to_bytes()).collect(),
                }
            }

            fn from_proto(proto: Self::Proto) -> MsResult<Self> {
                check_bound(stringify!($field), $max, proto.$field.len())?;
                Ok(Self {
                    $field: proto
                        .$field
                        .iter()
                        .map(|b| <$item>::from_wire(stringify!($field), b))
                        .collect::<MsResult<_>>()?,
                })
            }

            fn validate(&self) -> MsResult<()> {
                check_bound(stringify!($field), $max, self.$field.len())
            }
        }
    };
}

id_list!(
    /// One hash per sampled layer, in ascending layer order.
    /// The answer to a [MeshHashRequest].
    MeshHashes,
    proto::MeshHashes,
    hashes,
    ContentHash,
    MAX_MESH_HASHES
);

id_list!(
    /// All activation ids of an epoch.
    EpochData,
    proto::EpochData,
    atx_ids,
    AtxId,
    MAX_EPOCH_ATXS
);

id_list!(
    /// All ballot ids of a layer.
    LayerData,
    proto::LayerData,
    ballots,
    BallotId,
    MAX_LAYER_BALLOTS
);

id_list!(
    /// Identities proven malicious.
    MaliciousIds,
    proto::MaliciousIds,
    node_ids,
    NodeId,
    MAX_MALICIOUS_IDS
);

/// Ask for the [EpochData] of an epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EpochRequest {
    /// The requested epoch.
    pub epoch: EpochId,
}

impl WireMessage for EpochRequest {
    type Proto = proto::EpochRequest;
    const NAME: &'static str = "EpochRequest";
    const MAX_ENCODED_LEN: usize = FIELD_OVERHEAD;

    fn to_proto(&self) -> Self::Proto {
        proto::EpochRequest {
            epoch: self.epoch.0,
        }
    }

    fn from_proto(proto: Self::Proto) -> MsResult<Self> {
        Ok(Self {
            epoch: EpochId(proto.epoch),
        })
    }
}

/// Ask for the [LayerData] of a layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerRequest {
    /// The requested layer.
    pub layer: LayerId,
}

impl WireMessage for LayerRequest {
    type Proto = proto::LayerRequest;
    const NAME: &'static str = "LayerRequest";
    const MAX_ENCODED_LEN: usize = FIELD_OVERHEAD;

    fn to_proto(&self) -> Self::Proto {
        proto::LayerRequest {
            layer: self.layer.0,
        }
    }

    fn from_proto(proto: Self::Proto) -> MsResult<Self> {
        Ok(Self {
            layer: LayerId(proto.layer),
        })
    }
}

/// Ask for all known [MaliciousIds].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaliciousIdsRequest;

impl WireMessage for MaliciousIdsRequest {
    type Proto = proto::MaliciousIdsRequest;
    const NAME: &'static str = "MaliciousIdsRequest";
    const MAX_ENCODED_LEN: usize = FIELD_OVERHEAD;

    fn to_proto(&self) -> Self::Proto {
        proto::MaliciousIdsRequest {}
    }

    fn from_proto(_proto: Self::Proto) -> MsResult<Self> {
        Ok(Self)
    }
}

/// A request as received by the answering peer.
///
/// On the wire every request is wrapped in a [proto::FetchMessage] envelope
/// naming its type. Responses are sent without envelope, the requester
/// knows what it asked for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerRequest {
    /// Artifacts by hash, answered with a [ResponseBatch].
    HashBatch(RequestBatch),
    /// Sampled layer hashes, answered with [MeshHashes].
    MeshHashes(MeshHashRequest),
    /// Activations of an epoch, answered with [EpochData].
    EpochData(EpochRequest),
    /// Ballots of a layer, answered with [LayerData].
    LayerData(LayerRequest),
    /// Known malicious identities, answered with [MaliciousIds].
    MaliciousIds(MaliciousIdsRequest),
    /// A layer opinion, answered with a [LayerOpinion].
    LayerOpinion(OpinionRequest),
}

impl PeerRequest {
    /// Upper bound of an encoded request envelope.
    pub const MAX_ENCODED_LEN: usize =
        RequestBatch::MAX_ENCODED_LEN + 2 * FIELD_OVERHEAD;

    fn parts(&self) -> (proto::fetch_message::FetchMessageType, Bytes) {
        use proto::fetch_message::FetchMessageType as Ty;
        match self {
            Self::HashBatch(r) => (Ty::HashBatch, r.encode()),
            Self::MeshHashes(r) => (Ty::MeshHashes, r.encode()),
            Self::EpochData(r) => (Ty::EpochData, r.encode()),
            Self::LayerData(r) => (Ty::LayerData, r.encode()),
            Self::MaliciousIds(r) => (Ty::MaliciousIds, r.encode()),
            Self::LayerOpinion(r) => (Ty::LayerOpinion, r.encode()),
        }
    }

    /// Encode into a fetch message envelope.
    pub fn encode(&self) -> Bytes {
        let (ty, data) = self.parts();
        proto::FetchMessage {
            fetch_message_type: ty.into(),
            data,
        }
        .encode_to_vec()
        .into()
    }

    /// Decode a fetch message envelope and its content.
    pub fn decode(data: Bytes) -> MsResult<Self> {
        use proto::fetch_message::FetchMessageType as Ty;

        check_bound("FetchMessage", Self::MAX_ENCODED_LEN, data.len())?;
        let envelope = proto::FetchMessage::decode(data).map_err(|_| {
            MsError::bad_request(Violation::Malformed {
                field: "FetchMessage",
            })
        })?;
        let ty = Ty::try_from(envelope.fetch_message_type).map_err(|_| {
            MsError::bad_request(Violation::Unknown {
                field: "fetch_message_type",
                value: envelope.fetch_message_type as i64,
            })
        })?;
        let data = envelope.data;
        Ok(match ty {
            Ty::HashBatch => Self::HashBatch(RequestBatch::decode(data)?),
            Ty::MeshHashes => Self::MeshHashes(MeshHashRequest::decode(data)?),
            Ty::EpochData => Self::EpochData(EpochRequest::decode(data)?),
            Ty::LayerData => Self::LayerData(LayerRequest::decode(data)?),
            Ty::MaliciousIds => {
                Self::MaliciousIds(MaliciousIdsRequest::decode(data)?)
            }
            Ty::LayerOpinion => {
                Self::LayerOpinion(OpinionRequest::decode(data)?)
            }
            Ty::Unspecified => {
                return Err(MsError::bad_request(Violation::Unknown {
                    field: "fetch_message_type",
                    value: 0,
                }))
            }
        })
    }
}
