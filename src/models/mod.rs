pub mod enums;
pub mod result;
pub mod template;

pub use enums::*;
pub use result::*;
pub use template::*;
