//! Reading and writing of Point Cloud Data (.pcd) files.
//!
//! [pcd] holds the file format, [lzf] the codec behind the `binary_compressed` storage type.

pub mod lzf;
pub mod pcd;

pub use pcd::read_pcd_file as load;
