pub mod feature_state;
pub mod keyed_lock;
pub mod paging;
pub mod sampler;
pub mod stored_query;
pub mod transaction;

pub use feature_state::{FeatureStateTable, Lifecycle, LockState, VersionLabel};
pub use keyed_lock::KeyedLocks;
pub use paging::{Page, PageCursor, PagingController, QueryTemplate, SortOrder};
pub use sampler::{DataSampler, FeatureSample, SampledFeature};
pub use stored_query::{StoredQueryDescriptor, StoredQueryManager, StoredQueryParameter};
pub use transaction::{
    Compensation, LockResult, TransactionEngine, TransactionKind, TransactionPayload,
    TransactionRecord, TransactionScope,
};
