pub mod asset;
pub mod object;
pub mod upload;
pub mod user;

pub use asset::*;
pub use object::*;
pub use upload::*;
pub use user::*;
