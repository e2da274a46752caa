use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgendaItemId(pub i64);

/// Fixed sections of the Monday investment review agenda, in document order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgendaCategory {
    InvestmentDecisions,
    PipelineReview,
    PortfolioUpdates,
    OtherBusiness,
}

impl AgendaCategory {
    pub const ALL: [AgendaCategory; 4] = [
        AgendaCategory::InvestmentDecisions,
        AgendaCategory::PipelineReview,
        AgendaCategory::PortfolioUpdates,
        AgendaCategory::OtherBusiness,
    ];

    /// Values advertised in the `add_to_agenda` tool schema.
    pub const TOOL_VALUES: [&'static str; 4] =
        ["Investment Decisions", "Pipeline", "Portfolio Updates", "Other"];

    pub fn label(self) -> &'static str {
        match self {
            Self::InvestmentDecisions => "Investment Decisions",
            Self::PipelineReview => "Pipeline Review",
            Self::PortfolioUpdates => "Portfolio Company Updates",
            Self::OtherBusiness => "Other Business",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.label() == value)
    }

    /// Maps the short keyword typed after `/pillar agenda add`.
    pub fn from_alias(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "investment" | "decision" => Self::InvestmentDecisions,
            "pipeline" | "deal" => Self::PipelineReview,
            "portfolio" | "company" => Self::PortfolioUpdates,
            _ => Self::OtherBusiness,
        }
    }

    /// Maps the category chosen by the model. Anything outside the schema enum
    /// lands in Other Business.
    pub fn from_tool_value(value: &str) -> Self {
        match value.trim() {
            "Investment Decisions" => Self::InvestmentDecisions,
            "Pipeline" | "Pipeline Review" => Self::PipelineReview,
            "Portfolio Updates" | "Portfolio Company Updates" => Self::PortfolioUpdates,
            _ => Self::OtherBusiness,
        }
    }

    pub fn action_id(self) -> &'static str {
        match self {
            Self::InvestmentDecisions => "agenda_investment",
            Self::PipelineReview => "agenda_pipeline",
            Self::PortfolioUpdates => "agenda_portfolio",
            Self::OtherBusiness => "agenda_other",
        }
    }

    pub fn from_action_id(action_id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.action_id() == action_id)
    }
}

impl std::fmt::Display for AgendaCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAgendaItem {
    pub user_id: String,
    pub channel_id: String,
    pub category: AgendaCategory,
    pub content: String,
}

impl NewAgendaItem {
    pub fn new(
        user_id: impl Into<String>,
        channel_id: impl Into<String>,
        category: AgendaCategory,
        content: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let content = content.into().trim().to_string();
        if content.is_empty() {
            return Err(DomainError::EmptyAgendaContent);
        }

        Ok(Self { user_id: user_id.into(), channel_id: channel_id.into(), category, content })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgendaItem {
    pub id: AgendaItemId,
    pub user_id: String,
    pub channel_id: String,
    pub category: AgendaCategory,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub included_in_doc: bool,
}

impl AgendaItem {
    /// Inclusion only ever moves from pending to included.
    pub fn mark_included(&mut self) -> Result<(), DomainError> {
        if self.included_in_doc {
            return Err(DomainError::AgendaItemAlreadyIncluded { id: self.id.0 });
        }
        self.included_in_doc = true;
        Ok(())
    }
}

/// Items bucketed by category in agenda order; empty categories are omitted.
pub fn group_by_category(items: &[AgendaItem]) -> Vec<(AgendaCategory, Vec<&AgendaItem>)> {
    AgendaCategory::ALL
        .into_iter()
        .filter_map(|category| {
            let bucket: Vec<&AgendaItem> =
                items.iter().filter(|item| item.category == category).collect();
            (!bucket.is_empty()).then_some((category, bucket))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{group_by_category, AgendaCategory, AgendaItem, AgendaItemId, NewAgendaItem};
    use crate::errors::DomainError;

    fn item(id: i64, category: AgendaCategory, content: &str) -> AgendaItem {
        AgendaItem {
            id: AgendaItemId(id),
            user_id: "U1".to_string(),
            channel_id: "C1".to_string(),
            category,
            content: content.to_string(),
            created_at: Utc::now(),
            included_in_doc: false,
        }
    }

    #[test]
    fn aliases_map_to_canonical_sections() {
        assert_eq!(AgendaCategory::from_alias("pipeline"), AgendaCategory::PipelineReview);
        assert_eq!(AgendaCategory::from_alias("Deal"), AgendaCategory::PipelineReview);
        assert_eq!(AgendaCategory::from_alias("decision"), AgendaCategory::InvestmentDecisions);
        assert_eq!(AgendaCategory::from_alias("company"), AgendaCategory::PortfolioUpdates);
        assert_eq!(AgendaCategory::from_alias("misc"), AgendaCategory::OtherBusiness);
    }

    #[test]
    fn tool_values_outside_the_schema_fall_back_to_other_business() {
        assert_eq!(AgendaCategory::from_tool_value("Pipeline"), AgendaCategory::PipelineReview);
        assert_eq!(
            AgendaCategory::from_tool_value("Portfolio Updates"),
            AgendaCategory::PortfolioUpdates
        );
        assert_eq!(AgendaCategory::from_tool_value("Hiring"), AgendaCategory::OtherBusiness);
        assert_eq!(AgendaCategory::from_tool_value(""), AgendaCategory::OtherBusiness);
    }

    #[test]
    fn every_tool_value_resolves_to_a_distinct_section() {
        let mut resolved: Vec<AgendaCategory> =
            AgendaCategory::TOOL_VALUES.iter().map(|v| AgendaCategory::from_tool_value(v)).collect();
        resolved.sort();
        resolved.dedup();
        assert_eq!(resolved.len(), 4);
    }

    #[test]
    fn labels_and_action_ids_round_trip() {
        for category in AgendaCategory::ALL {
            assert_eq!(AgendaCategory::from_label(category.label()), Some(category));
            assert_eq!(AgendaCategory::from_action_id(category.action_id()), Some(category));
        }
        assert_eq!(AgendaCategory::from_action_id("google_auth"), None);
    }

    #[test]
    fn new_item_rejects_blank_content() {
        let result = NewAgendaItem::new("U1", "C1", AgendaCategory::OtherBusiness, "   ");
        assert_eq!(result, Err(DomainError::EmptyAgendaContent));
    }

    #[test]
    fn inclusion_is_monotonic() {
        let mut agenda_item = item(7, AgendaCategory::PipelineReview, "Intro from Partner X");
        assert!(agenda_item.mark_included().is_ok());
        assert!(agenda_item.included_in_doc);
        assert_eq!(
            agenda_item.mark_included(),
            Err(DomainError::AgendaItemAlreadyIncluded { id: 7 })
        );
    }

    #[test]
    fn grouping_follows_agenda_order_and_skips_empty_sections() {
        let items = vec![
            item(1, AgendaCategory::OtherBusiness, "Offsite dates"),
            item(2, AgendaCategory::InvestmentDecisions, "Acme Series A"),
            item(3, AgendaCategory::OtherBusiness, "Holiday party"),
        ];

        let grouped = group_by_category(&items);
        let sections: Vec<AgendaCategory> = grouped.iter().map(|(c, _)| *c).collect();
        assert_eq!(
            sections,
            vec![AgendaCategory::InvestmentDecisions, AgendaCategory::OtherBusiness]
        );
        assert_eq!(grouped[1].1.len(), 2);
        assert_eq!(grouped[1].1[0].content, "Offsite dates");
    }
}
