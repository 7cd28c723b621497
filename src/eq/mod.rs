//! EQ Curve Designer
//!
//! Target curve construction and linear-phase FIR design.

pub mod curve;
pub mod fir;

pub use curve::{CurveDesigner, CurveShaping, FrequencyCurve};
pub use fir::{odd_taps, FirFilter};
