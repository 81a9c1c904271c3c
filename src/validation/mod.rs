pub mod checks;
pub mod exception;
pub mod schema;
pub mod validator;

pub use checks::Check;
pub use exception::{ExceptionReport, OwsException};
pub use schema::{SchemaRef, SchemaValidator, StructuralValidator};
pub use validator::{Expect, Expectations, ResponseValidator, ValidationResult};
