//! Revision, transaction, node and copy identifiers.

use std::fmt;

/// A non-negative, monotonically increasing revision number. Revision 0 is
/// the initial empty tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rev(pub u64);

impl Rev {
    pub const ZERO: Rev = Rev(0);

    pub fn next(self) -> Rev {
        Rev(self.0 + 1)
    }
}

impl fmt::Display for Rev {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `"<base-rev>-<seq>"`, where `seq` is a base-36 counter. Unique across the
/// lifetime of the repository in the post-1.5 on-disk format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId(String);

impl TxnId {
    pub fn new(base_rev: Rev, seq: u64) -> Self {
        TxnId(format!("{}-{}", base_rev.0, to_base36(seq)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the base revision out of a TxnId's `<base-rev>-<seq>` shape.
    pub fn base_rev(&self) -> Option<Rev> {
        let (rev, _) = self.0.split_once('-')?;
        rev.parse::<u64>().ok().map(Rev)
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Base-36 encode, matching the `txn-current` counter encoding.
pub fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).expect("base36 digits are ASCII")
}

pub fn from_base36(s: &str) -> Option<u64> {
    u64::from_str_radix(s, 36).ok()
}

/// A node id is provisional (mutable, inside a transaction) until commit
/// rewrites it to a permanent, revision-qualified id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeId {
    /// `_<counter>`, allocated inside a transaction and not yet committed.
    Provisional(String),
    /// `<counter>-<rev>` (modern format), permanent once committed.
    Permanent(String, Rev),
}

impl NodeId {
    pub fn provisional(counter: &str) -> Self {
        NodeId::Provisional(format!("_{counter}"))
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, NodeId::Provisional(_))
    }

    /// Rewrites a provisional id to its permanent, revision-qualified form.
    pub fn finalize(&self, rev: Rev) -> NodeId {
        match self {
            NodeId::Provisional(raw) => {
                let counter = raw.strip_prefix('_').unwrap_or(raw);
                NodeId::Permanent(counter.to_string(), rev)
            }
            NodeId::Permanent(counter, r) => NodeId::Permanent(counter.clone(), *r),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Provisional(s) => write!(f, "{s}"),
            NodeId::Permanent(c, r) => write!(f, "{c}-{r}"),
        }
    }
}

/// Copy ids share the provisional/permanent shape of node ids but are kept
/// as a distinct type to avoid mixing the two id spaces.
pub type CopyId = NodeId;
