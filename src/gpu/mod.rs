//! GPU rendering: wgpu state and the shared image atlas.

pub mod atlas;
pub mod state;

pub use state::GpuState;
