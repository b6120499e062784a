pub mod preview;
pub mod render;
pub mod tree_data;
