//! 카탈로그 수집 모듈.

pub mod artifacts;
pub mod checkpoint;
pub mod failures;
pub mod market_collect;
pub mod progress;
pub mod sink;
pub mod storage;

pub use artifacts::{
    aggregate_path, events_snapshot_path, AggregateArtifact, ArtifactStore, EventsSnapshot,
    KeyArtifact, RecoverySummary,
};
pub use checkpoint::{
    Checkpoint, CheckpointDomain, CheckpointStore, CollectionRecord, Diff, RunStatus,
};
pub use failures::{FailureLog, FailureRecord};
pub use market_collect::{CollectOutcome, MarketCollector, RetryPolicy};
pub use progress::{CheckpointStatus, ProgressStore, RunProgress};
pub use sink::{CollectionSink, Completion, SinkSummary};
