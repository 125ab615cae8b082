//! Parameter vector handling: layout, packing, scaling, grid bounds and constraints.
//!
//! The optimiser sees a flat `Array1<f64>`. Everything needed to map between
//! that vector and the model state is derived from one [`ParamLayout`].

pub mod bounds;
pub mod constraints;
pub mod layout;
pub mod scaling;

pub use bounds::Bounds;
pub use constraints::{project_populations, LinearConstraints};
pub use layout::{ParamField, ParamKind, ParamLayout};
pub use scaling::Scaling;
