mod exports;
pub use exports::*;

pub mod angles;
pub mod config;
pub mod engine;
pub mod error;
pub mod fom;
pub mod geometry;
pub mod init;
pub mod projector;
pub mod sart;
pub mod subsets;
pub mod tv;
pub mod types;
pub mod utils;
pub mod weights;
