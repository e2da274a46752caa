use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use pillar_core::domain::agenda::{AgendaCategory, AgendaItemId, NewAgendaItem};
use pillar_core::domain::portfolio::{channel_name_for_company, PortfolioChannel};
use pillar_core::period::current_quarter;
use pillar_slack::blocks::{
    action_items_message, agenda_confirmation_message, doc_created_message, error_message,
    pending_agenda_message, portfolio_channels_message, portfolio_companies_message,
    portfolio_update_message,
};
use pillar_slack::commands::AGENDA_ADD_USAGE;
use pillar_slack::{CommandEnvelope, CommandRouteError, MessageTemplate, PillarCommandService};

use super::{DocumentAccess, PillarService, ServiceError, NO_MESSAGES};

pub(crate) const NO_AGENDA_ITEMS: &str =
    "No agenda items to include. Add items with `/pillar agenda add`";
pub(crate) const NO_PENDING_ITEMS: &str =
    "No pending agenda items. Add items with `/pillar agenda add`";
pub(crate) const DOC_FAILED: &str =
    "Failed to create Google Doc. Please check your Google connection.";

const LP_LETTER_MAX_COMPANIES: usize = 20;
const LP_LETTER_LOOKBACK_HOURS: u32 = 24 * 90;

impl PillarService {
    async fn finalize(&self, envelope: &CommandEnvelope) -> Result<MessageTemplate, ServiceError> {
        self.send_loading(envelope, "Generating Monday meeting agenda").await;

        let documents = match self.document_access(&envelope.user_id).await? {
            DocumentAccess::Ready(documents) => documents,
            DocumentAccess::Reply(reply) => return Ok(reply),
        };

        let items = self.agenda.list_pending().await?;
        if items.is_empty() {
            return Ok(error_message(NO_AGENDA_ITEMS));
        }

        let agenda = self.content.meeting_agenda(&items).await?;
        let title = format!("Pillar VC - Monday Meeting Agenda - {}", Utc::now().format("%Y-%m-%d"));

        match documents.create_document(&envelope.user_id, &title, &agenda).await {
            Ok(document) => {
                let ids: Vec<AgendaItemId> = items.iter().map(|item| item.id).collect();
                let marked = self.agenda.mark_included(&ids).await?;
                info!(
                    event_name = "pillar.agenda.finalized",
                    correlation_id = %envelope.request_id,
                    document_id = %document.document_id,
                    items = marked,
                    "agenda document created"
                );
                Ok(doc_created_message(&document.title, &document.url))
            }
            Err(error) => {
                warn!(
                    event_name = "pillar.agenda.document_failed",
                    correlation_id = %envelope.request_id,
                    error = %error,
                    "agenda document creation failed"
                );
                Ok(error_message(DOC_FAILED))
            }
        }
    }

    async fn company_overview(&self) -> Result<MessageTemplate, ServiceError> {
        if let Some(records) = &self.records {
            match records.list_companies().await {
                Ok(companies) if !companies.is_empty() => {
                    return Ok(portfolio_companies_message(&companies));
                }
                Ok(_) => {}
                Err(error) => warn!(error = %error, "listing portfolio companies failed"),
            }
        }

        let channels = self.gateway.portfolio_channels(&self.portfolio.channel_prefix).await?;
        if channels.is_empty() {
            return Ok(error_message("No portfolio channels found."));
        }
        Ok(portfolio_channels_message(&channels))
    }

    async fn company_update(
        &self,
        company: &str,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, ServiceError> {
        self.send_loading(envelope, &format!("Gathering updates for {company}")).await;

        let record = self.company_record(company).await;
        let channel_name = channel_name_for_company(&self.portfolio.channel_prefix, company);
        let mut channel_id = self.gateway.find_channel_id(&channel_name).await?;
        if channel_id.is_none() {
            if let Some(alternate) = record.as_ref().and_then(|record| record.slack_channel.as_deref())
            {
                channel_id = self.gateway.find_channel_id(alternate).await?;
            }
        }

        let messages = match &channel_id {
            Some(id) => self.gateway.channel_history(id, self.portfolio.max_lookback_hours).await?,
            None => Vec::new(),
        };

        if messages.is_empty() && record.is_none() {
            return Ok(error_message(&format!(
                "Could not find channel or data for '{company}'. Check the company name or \
                 ensure channel #{channel_name} exists."
            )));
        }

        let update = self.content.portfolio_update(company, &messages, record.as_ref()).await?;
        Ok(portfolio_update_message(company, &update, record.as_ref()))
    }

    async fn lp_section(&self, channel: &PortfolioChannel) -> Result<Option<String>, ServiceError> {
        let messages = self.gateway.channel_history(&channel.id, LP_LETTER_LOOKBACK_HOURS).await?;
        if messages.is_empty() {
            return Ok(None);
        }

        let record = self.company_record(&channel.company_name).await;
        let update =
            self.content.portfolio_update(&channel.company_name, &messages, record.as_ref()).await?;
        Ok(Some(self.content.lp_section(&channel.company_name, &update).await?))
    }

    async fn letter(
        &self,
        quarter: &str,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, ServiceError> {
        self.send_loading(envelope, &format!("Generating LP letter for {quarter}")).await;

        let documents = match self.document_access(&envelope.user_id).await? {
            DocumentAccess::Ready(documents) => documents,
            DocumentAccess::Reply(reply) => return Ok(reply),
        };

        let channels = self.gateway.portfolio_channels(&self.portfolio.channel_prefix).await?;
        if channels.is_empty() {
            return Ok(error_message("No portfolio channels found. Cannot generate LP letter."));
        }

        let mut sections = Vec::new();
        for channel in channels.iter().take(LP_LETTER_MAX_COMPANIES) {
            if let Some(section) = self.lp_section(channel).await? {
                sections.push((channel.company_name.clone(), section));
            }
        }
        if sections.is_empty() {
            return Ok(error_message("No portfolio activity found for this quarter."));
        }

        let letter = self.content.lp_letter(quarter, &sections).await?;
        let title = format!("Pillar VC - LP Letter - {quarter}");
        match documents.create_document(&envelope.user_id, &title, &letter).await {
            Ok(document) => Ok(doc_created_message(&document.title, &document.url)),
            Err(error) => {
                warn!(
                    event_name = "pillar.lp_letter.document_failed",
                    correlation_id = %envelope.request_id,
                    error = %error,
                    "LP letter document creation failed"
                );
                Ok(error_message(DOC_FAILED))
            }
        }
    }
}

#[async_trait]
impl PillarCommandService for PillarService {
    async fn summarize(
        &self,
        hours: Option<u32>,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        self.send_loading(envelope, "Analyzing channel history").await;
        let hours = hours.unwrap_or(self.portfolio.default_lookback_hours);
        Ok(self.summarize_channel(&envelope.channel_id, &envelope.user_id, hours).await?)
    }

    async fn catchup(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        self.send_loading(envelope, "Preparing your catch-up").await;
        Ok(self.catch_up(&envelope.channel_id, &envelope.user_id).await?)
    }

    async fn action_items(
        &self,
        user_id: Option<String>,
        hours: Option<u32>,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        self.send_loading(envelope, "Extracting action items").await;

        let user_filter = match user_id {
            Some(user_id) => Some(self.gateway.user_name(&user_id).await),
            None => None,
        };
        let hours = hours.unwrap_or(self.portfolio.default_lookback_hours);
        let messages = self
            .gateway
            .channel_history(&envelope.channel_id, hours)
            .await
            .map_err(ServiceError::from)?;
        if messages.is_empty() {
            return Ok(error_message(NO_MESSAGES));
        }

        let items = self
            .content
            .action_items(&messages, user_filter.as_deref())
            .await
            .map_err(ServiceError::from)?;
        let channel_name = self.channel_label(&envelope.channel_id).await;
        Ok(action_items_message(&items, Some(&channel_name)))
    }

    async fn add_agenda_item(
        &self,
        category: AgendaCategory,
        content: String,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let Ok(item) =
            NewAgendaItem::new(&envelope.user_id, &envelope.channel_id, category, content)
        else {
            return Ok(error_message(AGENDA_ADD_USAGE));
        };

        let stored = self.agenda.add(item).await.map_err(ServiceError::from)?;
        info!(
            event_name = "pillar.agenda.item_added",
            correlation_id = %envelope.request_id,
            item_id = stored.id.0,
            category = stored.category.label(),
            "agenda item added"
        );
        Ok(agenda_confirmation_message(stored.category, &stored.content))
    }

    async fn finalize_agenda(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        Ok(self.finalize(envelope).await?)
    }

    async fn view_agenda(
        &self,
        _envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let items = self.agenda.list_pending().await.map_err(ServiceError::from)?;
        Ok(pending_agenda_message(&items).unwrap_or_else(|| MessageTemplate::text(NO_PENDING_ITEMS)))
    }

    async fn portfolio(
        &self,
        company: Option<String>,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let reply = match company.as_deref() {
            None => self.company_overview().await?,
            Some(company) => self.company_update(company, envelope).await?,
        };
        Ok(reply)
    }

    async fn lp_letter(
        &self,
        quarter: Option<String>,
        envelope: &CommandEnvelope,
    ) -> Result<MessageTemplate, CommandRouteError> {
        let quarter = quarter.unwrap_or_else(|| current_quarter(Utc::now()));
        Ok(self.letter(&quarter, envelope).await?)
    }
}

#[cfg(test)]
mod tests {
    use pillar_core::domain::agenda::{AgendaCategory, NewAgendaItem};
    use pillar_core::domain::portfolio::CompanyRecord;
    use pillar_db::repositories::AgendaRepository;
    use pillar_slack::commands::{normalize_pillar_command, CommandRouter, SlashCommandPayload};
    use pillar_slack::{CommandEnvelope, PillarCommandService};

    use super::{DOC_FAILED, NO_AGENDA_ITEMS, NO_PENDING_ITEMS};
    use crate::services::testing::{
        message, FakeDocs, FakeRecords, FakeSlack, HarnessBuilder, QueuedLlm,
    };

    fn envelope(verb: &str) -> CommandEnvelope {
        CommandEnvelope {
            verb: verb.to_string(),
            args: String::new(),
            channel_id: "C1".to_string(),
            user_id: "U1".to_string(),
            trigger_id: None,
            response_url: Some("https://hooks.slack.test/response".to_string()),
            request_id: "req-1".to_string(),
        }
    }

    #[tokio::test]
    async fn agenda_add_then_view_groups_by_category() {
        let harness = HarnessBuilder::new(FakeSlack::default()).build();
        let service = &harness.service;

        let added = service
            .add_agenda_item(
                AgendaCategory::PortfolioUpdates,
                "Acme Q3 board recap".to_string(),
                &envelope("agenda"),
            )
            .await
            .expect("add");
        assert!(added.visible_text().contains("*Portfolio Company Updates*"));

        let view = service.view_agenda(&envelope("agenda")).await.expect("view");
        let text = view.visible_text();
        assert!(text.contains("*Portfolio Company Updates*"));
        assert!(text.contains("  - Acme Q3 board recap"));
    }

    #[tokio::test]
    async fn empty_agenda_view_points_at_the_add_command() {
        let harness = HarnessBuilder::new(FakeSlack::default()).build();

        let view = harness.service.view_agenda(&envelope("agenda")).await.expect("view");

        assert_eq!(view.visible_text(), NO_PENDING_ITEMS);
    }

    #[tokio::test]
    async fn finalize_without_a_google_connection_prompts_for_consent() {
        let harness =
            HarnessBuilder::new(FakeSlack::default()).docs(FakeDocs::default()).build();
        harness
            .agenda
            .add(
                NewAgendaItem::new("U1", "C1", AgendaCategory::OtherBusiness, "Offsite dates")
                    .expect("item"),
            )
            .await
            .expect("seed");

        let reply = harness.service.finalize_agenda(&envelope("agenda")).await.expect("reply");

        assert!(reply.visible_text().contains("Connect Google Account"));
        assert_eq!(harness.agenda.list_pending().await.expect("pending").len(), 1);
        assert_eq!(harness.llm.call_count(), 0);
    }

    #[tokio::test]
    async fn finalize_with_nothing_pending() {
        let harness = HarnessBuilder::new(FakeSlack::default())
            .docs(FakeDocs { authenticated: true, ..FakeDocs::default() })
            .build();

        let reply = harness.service.finalize_agenda(&envelope("agenda")).await.expect("reply");

        assert!(reply.visible_text().contains(NO_AGENDA_ITEMS));
    }

    #[tokio::test]
    async fn finalize_creates_a_document_and_marks_items() {
        let harness = HarnessBuilder::new(FakeSlack::default())
            .llm(QueuedLlm::answering(&["# Monday Investment Review"]))
            .docs(FakeDocs { authenticated: true, ..FakeDocs::default() })
            .build();
        for content in ["Acme follow-on", "Beta pipeline"] {
            harness
                .agenda
                .add(
                    NewAgendaItem::new("U1", "C1", AgendaCategory::InvestmentDecisions, content)
                        .expect("item"),
                )
                .await
                .expect("seed");
        }

        let reply = harness.service.finalize_agenda(&envelope("agenda")).await.expect("reply");

        assert!(reply.visible_text().contains("Pillar VC - Monday Meeting Agenda - "));
        assert!(harness.agenda.list_pending().await.expect("pending").is_empty());
        assert!(harness.agenda.all_items().await.iter().all(|item| item.included_in_doc));
        let responded = harness.slack.responded();
        assert_eq!(responded.len(), 1);
        assert!(responded[0].contains("_Generating Monday meeting agenda..._"));

        harness
            .service
            .add_agenda_item(
                AgendaCategory::PortfolioUpdates,
                "Gamma board recap".to_string(),
                &envelope("agenda"),
            )
            .await
            .expect("add after finalize");
        let view = harness.service.view_agenda(&envelope("agenda")).await.expect("view");
        let text = view.visible_text();
        assert!(text.contains("  - Gamma board recap"));
        assert!(!text.contains("Acme follow-on"));
        assert!(!text.contains("Beta pipeline"));
        assert!(!text.contains("*Investment Decisions*"));
    }

    #[tokio::test]
    async fn slash_agenda_add_then_view_lists_only_the_new_pipeline_item() {
        let harness = HarnessBuilder::new(FakeSlack::default()).build();
        let router = CommandRouter::new(harness.service.clone());
        let slash = |text: &str| SlashCommandPayload {
            command: "/pillar".to_string(),
            text: text.to_string(),
            channel_id: "C1".to_string(),
            user_id: "U1".to_string(),
            trigger_id: None,
            response_url: None,
            request_id: "req-2".to_string(),
        };

        let added = router
            .route(
                normalize_pillar_command(slash("agenda add pipeline \"Intro from Partner X\""))
                    .expect("normalize add"),
            )
            .await
            .expect("add");
        assert!(added.visible_text().contains("*Pipeline Review*"));

        let view = router
            .route(normalize_pillar_command(slash("agenda view")).expect("normalize view"))
            .await
            .expect("view");
        let text = view.visible_text();
        assert!(text.contains("*Pipeline Review*\n  - Intro from Partner X\n"));
        for other in ["Investment Decisions", "Portfolio Company Updates", "Other Business"] {
            assert!(!text.contains(other), "unexpected section {other}");
        }
        assert_eq!(text.matches("  - ").count(), 1);
    }

    #[tokio::test]
    async fn failed_document_keeps_items_pending() {
        let harness = HarnessBuilder::new(FakeSlack::default())
            .docs(FakeDocs { authenticated: true, fail: true, ..FakeDocs::default() })
            .build();
        harness
            .agenda
            .add(
                NewAgendaItem::new("U1", "C1", AgendaCategory::PipelineReview, "Gamma intro")
                    .expect("item"),
            )
            .await
            .expect("seed");

        let reply = harness.service.finalize_agenda(&envelope("agenda")).await.expect("reply");

        assert!(reply.visible_text().contains(DOC_FAILED));
        assert_eq!(harness.agenda.list_pending().await.expect("pending").len(), 1);
    }

    #[tokio::test]
    async fn action_items_filter_by_display_name() {
        let slack = FakeSlack::default().with_channel(
            "C1",
            "deal-flow",
            vec![message("Dana", "I'll send the memo", 5)],
        );
        let harness = HarnessBuilder::new(slack).llm(QueuedLlm::answering(&["- Dana: memo"])).build();

        let reply = harness
            .service
            .action_items(Some("U2".to_string()), None, &envelope("actions"))
            .await
            .expect("reply");

        assert!(reply.visible_text().contains("Action Items: #deal-flow"));
        assert!(harness.llm.prompt_text(0).contains("Dana"));
    }

    #[tokio::test]
    async fn portfolio_without_company_lists_channels() {
        let slack = FakeSlack::default()
            .with_channel("C7", "portfolio-acme-robotics", Vec::new())
            .with_channel("C8", "random", Vec::new());
        let harness = HarnessBuilder::new(slack).build();

        let reply = harness.service.portfolio(None, &envelope("portfolio")).await.expect("reply");

        let text = reply.visible_text();
        assert!(text.contains("#portfolio-acme-robotics (Acme Robotics)"));
        assert!(!text.contains("random"));
    }

    #[tokio::test]
    async fn portfolio_without_company_prefers_records() {
        let records = FakeRecords {
            companies: vec![CompanyRecord {
                name: "Acme".to_string(),
                sector: Some("Robotics".to_string()),
                ..CompanyRecord::default()
            }],
        };
        let harness = HarnessBuilder::new(FakeSlack::default()).records(records).build();

        let reply = harness.service.portfolio(None, &envelope("portfolio")).await.expect("reply");

        assert!(reply.visible_text().contains("  - Acme (Robotics)"));
    }

    #[tokio::test]
    async fn unknown_company_names_the_expected_channel() {
        let harness = HarnessBuilder::new(FakeSlack::default()).build();

        let reply = harness
            .service
            .portfolio(Some("Nimbus Labs".to_string()), &envelope("portfolio"))
            .await
            .expect("reply");

        assert!(reply.visible_text().contains(
            "Could not find channel or data for 'Nimbus Labs'. Check the company name or ensure \
             channel #portfolio-nimbus-labs exists."
        ));
        assert_eq!(harness.llm.call_count(), 0);
    }

    #[tokio::test]
    async fn company_update_reads_the_portfolio_channel() {
        let slack = FakeSlack::default().with_channel(
            "C7",
            "portfolio-acme",
            vec![message("Ana", "ARR crossed $2M", 120)],
        );
        let harness =
            HarnessBuilder::new(slack).llm(QueuedLlm::answering(&["Strong quarter"])).build();

        let reply = harness
            .service
            .portfolio(Some("Acme".to_string()), &envelope("portfolio"))
            .await
            .expect("reply");

        assert!(reply.visible_text().contains("Strong quarter"));
        assert!(harness.llm.prompt_text(0).contains("ARR crossed $2M"));
    }

    #[tokio::test]
    async fn lp_letter_skips_quiet_companies() {
        let slack = FakeSlack::default()
            .with_channel("C7", "portfolio-acme", vec![message("Ana", "Closed Series B", 600)])
            .with_channel("C8", "portfolio-quiet", Vec::new());
        let harness = HarnessBuilder::new(slack)
            .llm(QueuedLlm::answering(&["Acme update", "Acme section", "Dear LPs"]))
            .docs(FakeDocs { authenticated: true, ..FakeDocs::default() })
            .build();

        let reply = harness
            .service
            .lp_letter(Some("Q3 2026".to_string()), &envelope("lp-letter"))
            .await
            .expect("reply");

        assert!(reply.visible_text().contains("Pillar VC - LP Letter - Q3 2026"));
        assert_eq!(harness.llm.call_count(), 3);
        assert!(harness.llm.prompt_text(2).contains("Acme section"));
    }

    #[tokio::test]
    async fn lp_letter_without_portfolio_channels() {
        let harness = HarnessBuilder::new(FakeSlack::default())
            .docs(FakeDocs { authenticated: true, ..FakeDocs::default() })
            .build();

        let reply =
            harness.service.lp_letter(None, &envelope("lp-letter")).await.expect("reply");

        assert!(reply
            .visible_text()
            .contains("No portfolio channels found. Cannot generate LP letter."));
    }
}
