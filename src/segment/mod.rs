//! Binary segment storage: fixed-header files, append-only writes, tolerant
//! forward reads, grouping by shard, and compaction.

pub mod codec;
pub mod compactor;
pub mod group;
pub mod header;
pub mod reader;
pub mod writer;

pub use compactor::DefaultSegmentCompactor;
pub use group::PhaseSegmentGroup;
pub use header::BinaryHeader;
pub use reader::{SegmentIter, SegmentReader};
pub use writer::{SegmentWriter, DEFAULT_TARGET_BYTES};
