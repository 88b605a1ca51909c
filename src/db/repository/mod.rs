pub mod result;
pub mod template;
