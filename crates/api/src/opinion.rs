//! Layer opinions: a peer's attested state for a layer.

use crate::*;

/// Ask a peer for its opinion on a layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpinionRequest {
    /// The layer in question.
    pub layer: LayerId,
    /// If set, ask for the certificate of this block.
    pub block: Option<BlockId>,
}

impl WireMessage for OpinionRequest {
    type Proto = proto::OpinionRequest;
    const NAME: &'static str = "OpinionRequest";
    const MAX_ENCODED_LEN: usize = 64;

    fn to_proto(&self) -> Self::Proto {
        proto::OpinionRequest {
            layer: self.layer.0,
            block: self.block.map(|b| b.to_bytes()),
        }
    }

    fn from_proto(proto: Self::Proto) -> MsResult<Self> {
        Ok(Self {
            layer: LayerId(proto.layer),
            block: proto
                .block
                .map(|b| BlockId::from_wire("block", &b))
                .transpose()?,
        })
    }
}

/// A peer's opinion on a layer: the aggregated hash up to the previous
/// layer plus the certified block, if the peer has one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerOpinion {
    /// Aggregated mesh hash of the previous layer.
    pub prev_agg_hash: ContentHash,
    /// The block certified in this layer, if any.
    pub certified: Option<BlockId>,
}

impl WireMessage for LayerOpinion {
    type Proto = proto::LayerOpinion;
    const NAME: &'static str = "LayerOpinion";
    const MAX_ENCODED_LEN: usize = 128;

    fn to_proto(&self) -> Self::Proto {
        proto::LayerOpinion {
            prev_agg_hash: self.prev_agg_hash.to_bytes(),
            certified: self.certified.map(|b| b.to_bytes()),
        }
    }

    fn from_proto(proto: Self::Proto) -> MsResult<Self> {
        Ok(Self {
            prev_agg_hash: ContentHash::from_wire(
                "prev_agg_hash",
                &proto.prev_agg_hash,
            )?,
            certified: proto
                .certified
                .map(|b| BlockId::from_wire("certified", &b))
                .transpose()?,
        })
    }
}

/// A [LayerOpinion] together with the peer it was received from.
///
/// The peer is not part of the wire message, it is attached by the
/// receiving node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerOpinion {
    /// The peer that sent the opinion.
    pub peer: PeerId,
    /// The opinion as received.
    pub opinion: LayerOpinion,
}

impl std::fmt::Display for PeerOpinion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "peer: {} prev hash: {} has cert: {}",
            self.peer,
            self.opinion.prev_agg_hash,
            self.opinion.certified.is_some()
        )?;
        if let Some(cert) = &self.opinion.certified {
            write!(f, " cert block: {cert}")?;
        }
        Ok(())
    }
}
