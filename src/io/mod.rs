//! IO module for frames and descriptor dumps

mod descriptor_file;
mod frame;

pub use descriptor_file::{load_descriptor_set, save_descriptor_set, DescriptorFileError};
pub use frame::{to_grayscale, Frame};
