pub mod error;
pub mod fields;
pub mod memory;
pub mod patch;
pub mod providers;
pub mod traits;
pub mod types;

pub use error::*;
pub use fields::*;
pub use memory::*;
pub use patch::*;
pub use providers::*;
pub use traits::*;
pub use types::*;
