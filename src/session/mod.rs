pub mod export;
pub mod live;
