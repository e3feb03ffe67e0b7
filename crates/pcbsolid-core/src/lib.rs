pub mod curve;
pub mod geom;
pub mod model;
pub mod normalize;
pub mod outline;
pub mod report;
