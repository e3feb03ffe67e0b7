//! Solid-modeling backends.

mod prism;
mod traits;
#[cfg(feature = "truck")]
mod truck;

pub use prism::{PrismKernel, LINEAR_TOLERANCE};
#[cfg(feature = "truck")]
pub use truck::TruckKernel;
pub use traits::{
    Edge, Face, Kernel, KernelError, KernelResult, NullKernel, PrismBody, ProfileLoop,
    ProfileSegment, Solid, SolidInfo, Wire,
};
