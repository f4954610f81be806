pub mod errors;
pub mod expense;
pub mod form;
pub mod mutation;
pub mod record;
pub mod task;

pub use errors::*;
pub use expense::*;
pub use form::*;
pub use mutation::*;
pub use record::*;
pub use task::*;
