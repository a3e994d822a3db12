//! Record Storage
//!
//! In-memory record registry with a live ranking index and search helpers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        EntityStore                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────────────────┐   ┌───────────────────────────┐  │
//! │  │ DashMap<id, Record>    │   │ Mutex<BTreeMap<metric,    │  │
//! │  │ (lock-free per key)    │──▶│   Vec<Record>>> (desc)    │  │
//! │  └────────────────────────┘   └───────────────────────────┘  │
//! │              │                                                │
//! │       RecordSearch (regex over snapshots)                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod entity_store;
mod record;
mod search;

pub use entity_store::{EntityStore, RankingBucket};
pub use record::{Record, ScoreEntry, SequenceGenerator};
pub use search::{highlight_matches, RecordSearch, SearchField};
