#![doc = include_str!("../README.md")]

pub mod config;
mod label;
pub mod nested;
mod number;
pub mod raw;
mod render;
mod reshape;
mod table;

pub use config::Config;
pub use label::Label;
pub use nested::Nested;
pub use number::Number;
pub use raw::RawTable;
pub use render::Renderer;
pub use reshape::{load_aggregates, Aggregates};
pub use table::{Table, Values};
