//! Expert info: annotations that flag something noteworthy about a packet, independent of the
//! field it is attached to.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::proto::ProtoItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Comment,
    Chat,
    Note,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpertGroup {
    Checksum,
    Sequence,
    ResponseCode,
    RequestCode,
    Undecoded,
    Reassemble,
    Malformed,
    Protocol,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpertInfo {
    pub severity: Severity,
    pub group: ExpertGroup,
    pub summary: String,
    /// The tree node carrying the annotation. Null when the tree is not being built.
    pub item: ProtoItem,
}

impl ExpertInfo {
    pub fn new(severity: Severity, group: ExpertGroup, summary: impl Into<String>) -> Self {
        ExpertInfo {
            severity,
            group,
            summary: summary.into(),
            item: ProtoItem::NULL,
        }
    }
}

impl fmt::Display for ExpertInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}/{:?})", self.summary, self.severity, self.group)
    }
}
