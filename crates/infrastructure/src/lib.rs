pub mod api;
pub mod graphql;
pub mod identity;
pub mod image;
pub mod in_memory;
pub mod s3;
pub mod store;

pub use api::*;
pub use graphql::*;
pub use identity::*;
pub use image::*;
pub use in_memory::*;
pub use s3::*;
pub use store::*;
