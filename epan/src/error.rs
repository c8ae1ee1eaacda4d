use thiserror::Error;

use crate::ftypes::FieldType;

/// Everything that can go wrong while dissecting a packet.
///
/// The first group (bounds, reported bounds, out of range, malformed and the dissector bugs) is
/// caught at the nearest dispatch boundary and turned into an annotation on the tree. The second
/// group aborts the whole packet, see [`DissectError::is_recoverable`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DissectError {
    /// The bytes exist on the wire but were not captured (snapshot length).
    #[error("read of {len} bytes at offset {offset} is past the captured data ({captured} bytes)")]
    Bounds {
        offset: usize,
        len: usize,
        captured: usize,
    },

    /// The read goes beyond what the packet claims to contain.
    #[error("read of {len} bytes at offset {offset} is past the reported data ({reported} bytes)")]
    ReportedBounds {
        offset: usize,
        len: usize,
        reported: usize,
    },

    /// A subset was requested outside of its parent buffer.
    #[error("subset of {len} bytes at offset {offset} does not fit in {reported} bytes")]
    OutOfRange {
        offset: usize,
        len: usize,
        reported: usize,
    },

    #[error("malformed packet: {0}")]
    Malformed(String),

    #[error("maximum dissection depth of {depth} exceeded")]
    RecursionLimitExceeded { depth: usize },

    #[error("more than {max} items in the protocol tree")]
    TreeItemsExceeded { max: usize },

    #[error("no dissector for link type {link_type}")]
    UnrecognizedTopLevel { link_type: u32 },

    #[error("unknown field `{0}`")]
    UnknownField(String),

    #[error("unknown dissector table `{0}`")]
    UnknownTable(String),

    #[error("unknown heuristic list `{0}`")]
    UnknownHeuristicList(String),

    #[error("unknown dissector `{0}`")]
    UnknownDissector(String),

    #[error("a {ftype} field cannot span {len} bytes")]
    InvalidLength { ftype: FieldType, len: usize },

    #[error("integers are 1 to 8 bytes wide, not {width}")]
    InvalidWidth { width: usize },
}

impl DissectError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        DissectError::Malformed(reason.into())
    }

    /// Whether a dispatch boundary may absorb this error and let the outer layers continue.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            DissectError::RecursionLimitExceeded { .. }
                | DissectError::TreeItemsExceeded { .. }
                | DissectError::UnrecognizedTopLevel { .. }
        )
    }

    /// Errors caused by a bug in a dissector rather than by the packet.
    pub fn is_dissector_bug(&self) -> bool {
        matches!(
            self,
            DissectError::UnknownField(_)
                | DissectError::UnknownTable(_)
                | DissectError::UnknownHeuristicList(_)
                | DissectError::UnknownDissector(_)
                | DissectError::InvalidLength { .. }
                | DissectError::InvalidWidth { .. }
        )
    }
}
