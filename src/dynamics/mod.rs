//! Dynamic and adaptive stages
//!
//! Mid-channel stages that react to the programme material:
//! - Masking dip: low-mid bell cut when low-mids crowd the presence band
//! - De-esser: split-band sibilance reduction
//! - Harmonics: band-limited tanh residual
//! - Transient shaper: onset boost under a crest-factor guard
//! - Section lift: brighter, wider variant blended into loud sections

pub mod deess;
pub mod harmonics;
pub mod masking;
pub mod section_lift;
pub mod transient;

pub use deess::{DeEssParams, DeEsser};
pub use harmonics::{HarmonicExciter, HarmonicsParams};
pub use masking::{MaskingDip, MaskingParams};
pub use section_lift::{SectionLift, SectionLiftParams};
pub use transient::{TransientParams, TransientShaper};
