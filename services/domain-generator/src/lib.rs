//! Flood domain generator.
//!
//! Consumes forecast advisory notifications, finds the sites forecast to
//! flood at a watched severity, resolves each site's river network segment,
//! and dispatches a domain extraction for sites not yet extracted.

pub mod config;
pub mod consumer;
pub mod dispatch;
pub mod filter;
pub mod pipeline;
pub mod report;
pub mod resolver;
pub mod server;

pub use config::AppConfig;
pub use consumer::{ConsumerState, MessageConsumer, MessageOutcome, StateSnapshot};
pub use dispatch::{CommandDispatcher, DispatchError, Dispatcher};
pub use filter::SeverityFilter;
pub use pipeline::Pipeline;
pub use report::{ProcessingSummary, SiteOutcome, SiteReport, Stage};
pub use resolver::{AbsenceReason, ForecastLookup, ResolutionError};
