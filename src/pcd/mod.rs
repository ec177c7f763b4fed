//! Point Cloud Data (PCD)
//!
//! This module reads and writes the [.pcd format](https://pcl.readthedocs.io/projects/tutorials/en/master/pcd_file_format.html#pcd-file-format)
//! in all three storage types: `ascii`, `binary` and `binary_compressed`.
//!
//! Every point is decoded into a record holding one [PCDValue] per field. Fields with a
//! `COUNT` above one are not expanded, each field contributes exactly one value.
//!
//! # Examples
//!
//! ## Reading from a file
//! ```no_run
//! use pcdio::lzf::LzfBackendPreference;
//! use pcdio::pcd::{PCDReadError, read_pcd_file};
//!
//! fn main() -> Result<(), PCDReadError> {
//!     let file_pcd = read_pcd_file("example.pcd", LzfBackendPreference::Auto)?;
//!     println!("{:?} {}", file_pcd.fields(), file_pcd.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Writing to a file
//! ```no_run
//! use pcdio::lzf::LzfBackendPreference;
//! use pcdio::pcd::{write_pcd_file, write_xyz_pcd_file, read_pcd_file, PCDReadError, PCDDataType};
//!
//! fn main() -> Result<(), PCDReadError> {
//!     let file_pcd = read_pcd_file("example.pcd", LzfBackendPreference::Auto)?;
//!     write_pcd_file(&file_pcd, PCDDataType::Ascii, "new.pcd")?;
//!     write_pcd_file(&file_pcd, PCDDataType::BinaryCompressed, "new_compressed.pcd")?;
//!
//!     write_xyz_pcd_file(&[[0.0, 1.0, 2.0]], "xyz.pcd")?;
//!     Ok(())
//! }
//! ```

mod data_types;
mod reader;
mod writer;

pub use data_types::*;
pub use reader::{field_layouts, read_pcd, read_pcd_file, read_pcd_header, PCDReadError};
pub use writer::{write_pcd, write_pcd_file, write_xyz_pcd, write_xyz_pcd_file};
