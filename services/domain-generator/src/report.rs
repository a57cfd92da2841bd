//! Per-message processing report.

use serde::Serialize;

/// Pipeline stage a site failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Product,
    Parse,
    Metadata,
    Dedup,
    Dispatch,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Parse => "parse",
            Self::Metadata => "metadata",
            Self::Dedup => "dedup",
            Self::Dispatch => "dispatch",
        }
    }
}

/// What happened to one embedded site.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SiteOutcome {
    Dispatched { start_node_id: i64, end_node_id: i64 },
    AlreadyExtracted,
    /// Same LID seen earlier in this message.
    Duplicate,
    NoForecast,
    BelowWatch { category: String },
    NoSecondarySignal,
    Failed { stage: Stage, error: String },
}

impl SiteOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Dispatched { .. } => "dispatched",
            Self::AlreadyExtracted => "already_extracted",
            Self::Duplicate => "duplicate",
            Self::NoForecast => "no_forecast",
            Self::BelowWatch { .. } => "below_watch",
            Self::NoSecondarySignal => "no_secondary_signal",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteReport {
    /// 1-based position of the document in the product.
    pub index: usize,
    /// Unknown when the document could not be parsed.
    pub site_id: Option<String>,
    #[serde(flatten)]
    pub outcome: SiteOutcome,
}

/// Outcome of every site in one message.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessingSummary {
    pub sites: Vec<SiteReport>,
}

impl ProcessingSummary {
    pub fn record(&mut self, index: usize, site_id: Option<String>, outcome: SiteOutcome) {
        self.sites.push(SiteReport {
            index,
            site_id,
            outcome,
        });
    }

    pub fn total(&self) -> usize {
        self.sites.len()
    }

    pub fn count(&self, label: &str) -> usize {
        self.sites.iter().filter(|s| s.outcome.label() == label).count()
    }

    pub fn dispatched(&self) -> usize {
        self.count("dispatched")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }

    /// LIDs handed to the dispatcher, in order.
    pub fn dispatched_lids(&self) -> Vec<&str> {
        self.sites
            .iter()
            .filter(|s| matches!(s.outcome, SiteOutcome::Dispatched { .. }))
            .filter_map(|s| s.site_id.as_deref())
            .collect()
    }
}
