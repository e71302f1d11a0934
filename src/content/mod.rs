pub mod markdown;
pub mod sanitize;

pub use markdown::to_markdown;
pub use sanitize::sanitize;
