//! Data-driven 3D globe scene.
//!
//! A [`Globe`] keeps six layers (the globe sphere, points, polygons, tiles,
//! labels and custom objects) in a retained [`scene::Scene`]. Each layer
//! turns a list of records into scene nodes, reconciles them against the
//! previous pass and animates attribute changes on a frame clock.

pub mod accessor;
pub mod animation;
pub mod color;
pub mod digest;
pub mod error;
pub mod geo;
pub mod globe;
pub mod layers;
pub mod mesh;
pub mod scene;

pub use digest::DigestReport;
pub use error::GlobeError;
pub use geo::{to_cartesian, to_geographic, GeoCoords, GLOBE_RADIUS};
pub use globe::{Globe, GlobeOptions};
