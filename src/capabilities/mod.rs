pub mod app_schema;
pub mod feature_type;
pub mod model;

pub use feature_type::{FeatureTypeInfo, PropertyDescriptor, PropertyType};
pub use model::{CapabilityModel, ConformanceClass, FilterCapabilities, OperationInfo};
