//! Common types shared across the flood domain generator crates.

pub mod error;
pub mod forecast;
pub mod message;
pub mod network;

pub use error::{HydroError, HydroResult};
pub use forecast::{SiteForecast, ValidationError};
pub use message::{InboundMessage, ProductDocument};
pub use network::{
    parse_node_id, ExtractionJob, NetworkResolution, ReachMetadata, StageFlowEntry,
    StageFlowSeries, NO_DATA_SENTINEL,
};
