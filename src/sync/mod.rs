//! Save-data synchronization
//!
//! A sync session moves one save between this device and the active
//! provider:
//!
//! 1. Download the latest cloud save (if any)
//! 2. Compare the monitored fields of local and cloud saves
//! 3. Mark each differing field with a resolution according to the
//!    configured strategy
//! 4. Merge the resolutions into a copy of the local save
//! 5. Upload the result as a new cloud record
//!
//! Field paths are dot-separated (`player.money`) and address nested
//! objects inside the save's game data.

pub mod checksum;
pub mod conflict;
pub mod manager;
pub mod merge;
pub mod path;
pub mod types;

pub use checksum::{checksum, save_checksum};
pub use conflict::{
    apply_decisions, ConflictDetector, ConflictResolver, ConflictStrategy, ManualResolver,
    PreferLocal, PreferNewest, PreferRemote, DEFAULT_MONITORED_FIELDS,
};
pub use manager::SyncManager;
pub use merge::{merge, MergeOutcome};
pub use types::*;
