pub mod path;
pub mod path_buf;
pub mod tree;
