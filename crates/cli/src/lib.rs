//! Line commands and session state for the `fsfs` shell binary, split out
//! as a library so the commands can be exercised directly in tests without
//! going through a subprocess.

pub mod commands;
pub mod state;
