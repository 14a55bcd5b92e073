pub mod cursor;
pub mod texture;
