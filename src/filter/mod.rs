pub mod builder;
pub mod decode;
pub mod encode;
pub mod eval;
pub mod expression;

pub use builder::{BuiltFilter, FilterBuilder, FilterKind, FilterOptions};
pub use expression::{
    ComparisonOp, FilterExpression, JoinOperand, ResourceIdPredicate, SpatialJoin, SpatialOp,
    TemporalOp, TemporalValue, TimePosition, VersionAction,
};
