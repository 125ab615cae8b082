//! Alignment tensors and orientation geometry.

pub mod rotation;
pub mod tensor;

pub use rotation::{euler_to_rotation, rotate_tensor};
pub use tensor::{AlignTensor, TensorComponents, TENSOR_COMPONENT_NAMES};
