use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;

use pillar_core::config::AirtableConfig;
use pillar_core::domain::portfolio::{CompanyRecord, PipelineDeal};

use crate::error::{read_json, IntegrationError};

const SERVICE: &str = "airtable";
const COMPANIES_TABLE: &str = "Portfolio Companies";
const PIPELINE_TABLE: &str = "Pipeline";

#[async_trait]
pub trait RecordsService: Send + Sync {
    /// Case-insensitive lookup by company name.
    async fn find_company(&self, name: &str) -> Result<Option<CompanyRecord>, IntegrationError>;

    async fn list_companies(&self) -> Result<Vec<CompanyRecord>, IntegrationError>;

    async fn pipeline_deals(
        &self,
        status: Option<&str>,
    ) -> Result<Vec<PipelineDeal>, IntegrationError>;
}

pub struct AirtableClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    base_id: String,
}

impl AirtableClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        base_id: impl Into<String>,
    ) -> Result<Self, IntegrationError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|error| IntegrationError::http(SERVICE, error))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            base_id: base_id.into(),
        })
    }

    pub fn from_config(config: &AirtableConfig) -> Result<Option<Self>, IntegrationError> {
        match (&config.api_key, &config.base_id) {
            (Some(key), Some(base_id)) => Self::new(&config.base_url, key.clone(), base_id).map(Some),
            _ => Ok(None),
        }
    }

    /// Every record of `table`, following Airtable's `offset` pagination.
    async fn records(&self, table: &str, formula: Option<&str>) -> Result<Vec<Value>, IntegrationError> {
        let url = format!("{}/{}/{}", self.base_url, self.base_id, urlencoding::encode(table));
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut query: Vec<(&str, String)> = Vec::new();
            if let Some(formula) = formula {
                query.push(("filterByFormula", formula.to_string()));
            }
            if let Some(offset) = &offset {
                query.push(("offset", offset.clone()));
            }

            let response = self
                .http
                .get(&url)
                .bearer_auth(self.api_key.expose_secret())
                .query(&query)
                .send()
                .await
                .map_err(|error| IntegrationError::http(SERVICE, error))?;
            let mut page = read_json(SERVICE, response).await?;

            if let Some(Value::Array(batch)) = page.get_mut("records") {
                records.append(batch);
            }
            offset = page["offset"].as_str().map(str::to_string);
            if offset.is_none() {
                break;
            }
        }

        debug!(table, count = records.len(), "fetched airtable records");
        Ok(records)
    }
}

/// Airtable formulas quote with single quotes; escape any in user input.
fn formula_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Field values arrive as strings, numbers or arrays (linked records,
/// multi-selects); all of them render to display text.
fn field_text(fields: &Value, name: &str) -> Option<String> {
    match &fields[name] {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Array(items) => {
            let joined = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(text) => Some(text.clone()),
                    Value::Number(number) => Some(number.to_string()),
                    Value::Object(object) => object.get("name").and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(", ");
            (!joined.is_empty()).then_some(joined)
        }
        _ => None,
    }
}

fn company_from_record(record: &Value) -> CompanyRecord {
    let fields = &record["fields"];
    CompanyRecord {
        id: record["id"].as_str().unwrap_or_default().to_string(),
        name: field_text(fields, "Name").unwrap_or_default(),
        stage: field_text(fields, "Stage"),
        last_valuation: field_text(fields, "Last Valuation"),
        key_metrics: field_text(fields, "Key Metrics"),
        last_board_meeting: field_text(fields, "Last Board Meeting"),
        sector: field_text(fields, "Sector"),
        lead_partner: field_text(fields, "Lead Partner"),
        investment_date: field_text(fields, "Investment Date"),
        notes: field_text(fields, "Notes"),
        slack_channel: field_text(fields, "Slack Channel"),
    }
}

fn deal_from_record(record: &Value) -> PipelineDeal {
    let fields = &record["fields"];
    PipelineDeal {
        id: record["id"].as_str().unwrap_or_default().to_string(),
        company_name: field_text(fields, "Company Name").unwrap_or_default(),
        status: field_text(fields, "Status"),
        sector: field_text(fields, "Sector"),
        deal_owner: field_text(fields, "Deal Owner"),
        deal_stage: field_text(fields, "Deal Stage"),
        notes: field_text(fields, "Notes"),
        next_steps: field_text(fields, "Next Steps"),
    }
}

#[async_trait]
impl RecordsService for AirtableClient {
    async fn find_company(&self, name: &str) -> Result<Option<CompanyRecord>, IntegrationError> {
        let formula = format!("LOWER({{Name}}) = LOWER('{}')", formula_literal(name.trim()));
        let records = self.records(COMPANIES_TABLE, Some(&formula)).await?;
        Ok(records.first().map(company_from_record))
    }

    async fn list_companies(&self) -> Result<Vec<CompanyRecord>, IntegrationError> {
        let records = self.records(COMPANIES_TABLE, None).await?;
        Ok(records.iter().map(company_from_record).filter(|company| !company.name.is_empty()).collect())
    }

    async fn pipeline_deals(
        &self,
        status: Option<&str>,
    ) -> Result<Vec<PipelineDeal>, IntegrationError> {
        let formula = status.map(|status| format!("{{Status}} = '{}'", formula_literal(status)));
        let records = self.records(PIPELINE_TABLE, formula.as_deref()).await?;
        Ok(records.iter().map(deal_from_record).collect())
    }
}
