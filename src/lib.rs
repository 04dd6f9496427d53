pub mod normalize;
pub mod packer;
pub mod plan;
pub mod render;
pub mod report;
pub mod split;
pub mod types;
