//! Hierarchical spatial regression models.
//!
//! - [`input`] filters and densifies the processed table.
//! - [`spec`] holds the validated model graph and parameter layout.
//! - [`variant`] builds each named variant.
//! - `density` and `simulate` add the log density and forward simulation
//!   to [`ModelSpec`].

mod density;
pub mod input;
mod simulate;
pub mod spec;
pub mod variant;

pub use input::{prepare_input, DropReason, DroppedRow, InputColumns, ModelInput};
pub use spec::{
    Block, Equation, Likelihood, ModelSpec, ParameterLayout, Pooling, ScalePrior, SpatialTerm,
    Term,
};
pub use variant::{build_model, input_columns, ModelMetadata, Roles};
