pub mod bucket;
pub mod disk;
pub mod error;
pub mod layout;
pub mod lock;
pub mod remote;
pub mod store;

pub use bucket::*;
pub use disk::*;
pub use error::*;
pub use layout::*;
pub use lock::*;
pub use remote::*;
