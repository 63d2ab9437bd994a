//! WFA bintree automaton model (component F).

pub mod model;
pub mod mv;

pub use model::{FrameType, Wfa};
pub use mv::{MotionVector, MvType};
