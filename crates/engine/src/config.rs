//! Repository configuration: the tunable knobs named throughout spec.md §4
//! collected into one struct, the way the teacher collects its own
//! per-database tunables into a single config value passed down from `open`.

use fsfs_core::DeltaLimits;
use fsfs_storage::{CurrentFormat, ProtoRevLayout};
use serde::{Deserialize, Serialize};

/// Repository-wide configuration, fixed at `create` time and read back on
/// every `open` (spec.md §6 `format` file plus the `fs.*` knobs it implies).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoConfig {
    pub delta_limits: DeltaLimits,
    /// `None` disables sharding: every revision lives directly under `revs/`.
    pub max_files_per_dir: Option<u32>,
    #[serde(with = "proto_rev_layout_serde")]
    pub proto_rev_layout: ProtoRevLayout,
    #[serde(with = "current_format_serde")]
    pub current_format: CurrentFormat,
    /// Disables rep-sharing lookups entirely (spec.md §4.4 step 1);
    /// reps are still deduplicated within a single commit via the
    /// in-memory overlay regardless, since that costs nothing extra.
    pub enable_rep_sharing: bool,
}

impl Default for RepoConfig {
    fn default() -> Self {
        RepoConfig {
            delta_limits: DeltaLimits::default(),
            max_files_per_dir: Some(1000),
            proto_rev_layout: ProtoRevLayout::OutOfTree,
            current_format: CurrentFormat::Modern,
            enable_rep_sharing: true,
        }
    }
}

mod proto_rev_layout_serde {
    use fsfs_storage::ProtoRevLayout;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    enum Wire {
        InTxnDir,
        OutOfTree,
    }

    pub fn serialize<S: Serializer>(v: &ProtoRevLayout, s: S) -> Result<S::Ok, S::Error> {
        let w = match v {
            ProtoRevLayout::InTxnDir => Wire::InTxnDir,
            ProtoRevLayout::OutOfTree => Wire::OutOfTree,
        };
        w.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<ProtoRevLayout, D::Error> {
        Ok(match Wire::deserialize(d)? {
            Wire::InTxnDir => ProtoRevLayout::InTxnDir,
            Wire::OutOfTree => ProtoRevLayout::OutOfTree,
        })
    }
}

mod current_format_serde {
    use fsfs_storage::CurrentFormat;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    enum Wire {
        Modern,
        Legacy,
    }

    pub fn serialize<S: Serializer>(v: &CurrentFormat, s: S) -> Result<S::Ok, S::Error> {
        let w = match v {
            CurrentFormat::Modern => Wire::Modern,
            CurrentFormat::Legacy => Wire::Legacy,
        };
        w.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<CurrentFormat, D::Error> {
        Ok(match Wire::deserialize(d)? {
            Wire::Modern => CurrentFormat::Modern,
            Wire::Legacy => CurrentFormat::Legacy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = RepoConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: RepoConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_files_per_dir, config.max_files_per_dir);
    }
}
