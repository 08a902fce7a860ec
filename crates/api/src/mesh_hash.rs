//! Sampled layer hash requests, used to find where two meshes diverge.

use crate::*;

/// Max number of layer hashes a single [MeshHashRequest] may ask for.
pub const MAX_HASHES_IN_REQ: usize = 100;

/// Request the hashes of layers `from..=to`, one every `step` layers.
///
/// The last layer `to` is always part of the sample, even when it is not a
/// multiple of `step` away from `from`. The number of sampled layers is
/// limited by [MAX_HASHES_IN_REQ].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshHashRequest {
    /// First requested layer.
    pub from: LayerId,
    /// Last requested layer.
    pub to: LayerId,
    /// Distance between sampled layers.
    pub step: u32,
}

impl MeshHashRequest {
    /// Request `from..=to` with the densest sampling that still fits
    /// [MAX_HASHES_IN_REQ].
    ///
    /// `to` before `from` yields a request that fails [Self::validate].
    pub fn new(from: LayerId, to: LayerId) -> Self {
        let diff = to.difference(from);
        let step = diff.div_ceil(MAX_HASHES_IN_REQ as u32 - 1).max(1);
        Self { from, to, step }
    }

    /// The number of layers sampled by this request.
    ///
    /// `None` if `step` is zero or `to` is before `from`.
    pub fn count(&self) -> Option<usize> {
        if self.step == 0 || self.to < self.from {
            return None;
        }
        let diff = self.to.difference(self.from);
        let mut count = (diff / self.step) as usize + 1;
        if diff % self.step != 0 {
            // the last layer is not a multiple of step, it is added on top
            count += 1;
        }
        Some(count)
    }

    /// Check the request invariants.
    pub fn validate(&self) -> MsResult<()> {
        if self.step == 0 {
            return Err(MsError::bad_request(Violation::Invariant {
                field: "step",
                reason: "must not be zero",
            }));
        }
        if self.to < self.from {
            return Err(MsError::bad_request(Violation::Invariant {
                field: "to",
                reason: "must not be before from",
            }));
        }
        let count = self.count().unwrap_or(usize::MAX);
        check_bound("layers", MAX_HASHES_IN_REQ, count)
    }

    /// The sampled layers in ascending order.
    ///
    /// Empty if the request is invalid.
    pub fn layers(&self) -> impl Iterator<Item = LayerId> {
        let MeshHashRequest { from, to, step } = *self;
        let count = match self.validate() {
            Ok(()) => self.count().unwrap_or(0),
            Err(_) => 0,
        };
        (0..count).map(move |i| {
            let l = from.plus(step.saturating_mul(i as u32));
            if l > to {
                to
            } else {
                l
            }
        })
    }
}

impl WireMessage for MeshHashRequest {
    type Proto = proto::MeshHashRequest;
    const NAME: &'static str = "MeshHashRequest";
    const MAX_ENCODED_LEN: usize = 32;

    fn to_proto(&self) -> Self::Proto {
        proto::MeshHashRequest {
            from: self.from.0,
            to: self.to.0,
            step: self.step,
        }
    }

    fn from_proto(proto: Self::Proto) -> MsResult<Self> {
        let out = Self {
            from: LayerId(proto.from),
            to: LayerId(proto.to),
            step: proto.step,
        };
        out.validate()?;
        Ok(out)
    }

    fn validate(&self) -> MsResult<()> {
        MeshHashRequest::validate(self)
    }
}

impl std::fmt::Display for MeshHashRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "from: {} to: {} by: {}", self.from, self.to, self.step)
    }
}
