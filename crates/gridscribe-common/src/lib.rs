pub mod address;
pub mod diagnostic;
pub mod range;
pub mod value;

pub use address::*;
pub use diagnostic::*;
pub use range::*;
pub use value::*;
