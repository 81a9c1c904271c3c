//! Suite runs against the mock service, grouped by conformance class.

pub mod discovery;
pub mod external;
pub mod locking;
pub mod paging;
pub mod soap;
pub mod stored_queries;
pub mod transactions;
