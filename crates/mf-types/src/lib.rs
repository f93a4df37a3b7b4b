pub mod errors;
pub mod frame;
pub mod parameter;
pub mod space;

pub use errors::*;
pub use frame::*;
pub use parameter::*;
pub use space::*;
