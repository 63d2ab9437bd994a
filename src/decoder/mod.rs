//! Decoder engine (component H): WFA synthesis into pixel planes.

pub mod engine;

pub use crate::constants::block_dims;
pub use engine::decode_image;
