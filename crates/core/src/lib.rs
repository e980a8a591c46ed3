//! Data model shared by every layer of the FSFS transactional commit core:
//! revision and transaction identifiers, node revisions, representations,
//! changed-path records, path-ancestry helpers and the unified error type.

pub mod cancel;
pub mod change;
pub mod error;
pub mod ids;
pub mod limits;
pub mod node;
pub mod path;

pub use cancel::{Cancel, NeverCancel};
pub use change::{ChangeKind, ChangeRecord};
pub use error::{Error, RepBeingWrittenKind, Result};
pub use ids::{CopyId, NodeId, Rev, TxnId};
pub use limits::DeltaLimits;
pub use node::{CopyFrom, NodeKind, NodeRev, Rep, RepOrigin};
