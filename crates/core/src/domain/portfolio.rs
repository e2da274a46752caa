use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioChannel {
    pub id: String,
    pub name: String,
    pub company_name: String,
}

/// Row from the Airtable "Portfolio Companies" table. Every field except the
/// name is optional there.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub id: String,
    pub name: String,
    pub stage: Option<String>,
    pub last_valuation: Option<String>,
    pub key_metrics: Option<String>,
    pub last_board_meeting: Option<String>,
    pub sector: Option<String>,
    pub lead_partner: Option<String>,
    pub investment_date: Option<String>,
    pub notes: Option<String>,
    pub slack_channel: Option<String>,
}

impl CompanyRecord {
    /// Key/value block appended to portfolio-update prompts.
    pub fn prompt_details(&self) -> String {
        let fields = [
            ("Stage", &self.stage),
            ("Last Valuation", &self.last_valuation),
            ("Key Metrics", &self.key_metrics),
            ("Last Board Meeting", &self.last_board_meeting),
            ("Sector", &self.sector),
            ("Lead Partner", &self.lead_partner),
            ("Investment Date", &self.investment_date),
            ("Notes", &self.notes),
        ];

        fields
            .iter()
            .filter_map(|(label, value)| value.as_ref().map(|value| format!("{label}: {value}")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDeal {
    pub id: String,
    pub company_name: String,
    pub status: Option<String>,
    pub sector: Option<String>,
    pub deal_owner: Option<String>,
    pub deal_stage: Option<String>,
    pub notes: Option<String>,
    pub next_steps: Option<String>,
}

/// `Acme Robotics` with prefix `portfolio-` becomes `portfolio-acme-robotics`.
pub fn channel_name_for_company(prefix: &str, company: &str) -> String {
    format!("{prefix}{}", company.trim().to_lowercase().replace(' ', "-"))
}

/// Inverse of [`channel_name_for_company`], title-casing each word.
pub fn company_name_from_channel(prefix: &str, channel_name: &str) -> Option<String> {
    let remainder = channel_name.strip_prefix(prefix)?;
    if remainder.is_empty() {
        return None;
    }

    let words: Vec<String> = remainder
        .split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect();

    Some(words.join(" "))
}

#[cfg(test)]
mod tests {
    use super::{channel_name_for_company, company_name_from_channel, CompanyRecord};

    #[test]
    fn company_names_map_to_prefixed_channels() {
        assert_eq!(channel_name_for_company("portfolio-", "Acme Robotics"), "portfolio-acme-robotics");
        assert_eq!(channel_name_for_company("portfolio-", "  Zeta "), "portfolio-zeta");
    }

    #[test]
    fn channel_names_map_back_to_title_case_companies() {
        assert_eq!(
            company_name_from_channel("portfolio-", "portfolio-acme-robotics").as_deref(),
            Some("Acme Robotics")
        );
        assert_eq!(company_name_from_channel("portfolio-", "general"), None);
        assert_eq!(company_name_from_channel("portfolio-", "portfolio-"), None);
    }

    #[test]
    fn prompt_details_skip_missing_fields() {
        let record = CompanyRecord {
            name: "Acme".to_string(),
            stage: Some("Series A".to_string()),
            sector: Some("Robotics".to_string()),
            ..CompanyRecord::default()
        };
        assert_eq!(record.prompt_details(), "Stage: Series A\nSector: Robotics");
    }
}
