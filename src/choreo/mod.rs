pub mod beat;
pub mod camera;
pub mod engine;
pub mod pattern;
pub mod pool;
pub mod stutter;
