//! HML product parsing.
//!
//! An HML product is a WMO text product whose body is a concatenation of
//! XML documents, one `<site>` per forecast point. The documents are not
//! separated cleanly, so each one is rebuilt from the text between two
//! `?xml` markers before it is parsed.

pub mod error;
pub mod site;
pub mod splitter;

pub use error::{ParseError, ParseResult};
pub use site::{parse_site, Datum, Disclaimers, Observed, SiteRecord};
pub use splitter::{split_product, Fragment, Splitter};
