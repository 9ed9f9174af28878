pub mod errors;
pub mod experiment;
pub mod space;
pub mod trial;

pub use errors::*;
pub use experiment::*;
pub use space::*;
pub use trial::*;
