pub mod library;
pub mod manifest;
pub mod matte;
pub mod mipmap;
pub mod sdf;
