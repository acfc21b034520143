//! Utility functions and helpers for the multifit-rs library.

pub mod finite_difference;
pub mod matrix_convert;
pub mod norms;

// Re-export commonly used utilities
pub use matrix_convert::{
    nalgebra_to_ndarray, nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra,
};
pub use norms::{enorm, scaled_infnorm, scaled_norm};
