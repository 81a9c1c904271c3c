pub mod element;
pub mod namespaces;
pub mod reader;

pub use element::{Element, Node};
pub use namespaces::QName;
