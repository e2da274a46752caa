use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use pillar_core::domain::activity::UserActivity;
use pillar_core::domain::agenda::{AgendaCategory, NewAgendaItem};
use pillar_core::domain::portfolio::company_name_from_channel;
use pillar_slack::blocks::{
    agenda_confirmation_message, agenda_item_modal, portfolio_welcome_message,
    AGENDA_CONTENT_ACTION_ID, AGENDA_CONTENT_BLOCK_ID, AGENDA_MODAL_CALLBACK_ID,
    GOOGLE_AUTH_ACTION_ID,
};
use pillar_slack::events::{
    BlockActionEvent, MemberJoinedEvent, MessageEvent, ViewSubmissionEvent,
};
use pillar_slack::{
    ChannelEventService, EventContext, EventHandlerError, InteractionService, MessageTemplate,
};

use super::PillarService;

#[async_trait]
impl ChannelEventService for PillarService {
    async fn record_activity(
        &self,
        event: &MessageEvent,
        _ctx: &EventContext,
    ) -> Result<(), EventHandlerError> {
        let Some(user_id) = event.user_id.as_deref() else {
            return Ok(());
        };
        self.activity
            .record_activity(UserActivity::new(user_id, Utc::now()))
            .await
            .map_err(|error| EventHandlerError::ChannelEvent(error.to_string()))
    }

    async fn member_joined(
        &self,
        event: &MemberJoinedEvent,
        ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError> {
        let channel_name = match self.gateway.channel_name(&event.channel_id).await {
            Ok(name) => name,
            Err(error) => {
                debug!(channel_id = %event.channel_id, error = %error, "skipping welcome");
                return Ok(None);
            }
        };

        let Some(company) = company_name_from_channel(&self.portfolio.channel_prefix, &channel_name)
        else {
            return Ok(None);
        };
        info!(
            event_name = "pillar.portfolio.member_joined",
            correlation_id = %ctx.correlation_id,
            channel = %channel_name,
            user_id = %event.user_id,
            "welcoming member to portfolio channel"
        );
        Ok(Some(portfolio_welcome_message(&company)))
    }
}

#[async_trait]
impl InteractionService for PillarService {
    async fn handle_block_action(
        &self,
        event: &BlockActionEvent,
        _ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError> {
        if event.action_id == GOOGLE_AUTH_ACTION_ID {
            return Ok(None);
        }

        let Some(category) = AgendaCategory::from_action_id(&event.action_id) else {
            debug!(action_id = %event.action_id, "ignoring unknown block action");
            return Ok(None);
        };
        let Some(trigger_id) = event.trigger_id.as_deref() else {
            return Err(EventHandlerError::Interaction(format!(
                "block action `{}` arrived without a trigger id",
                event.action_id
            )));
        };

        self.gateway
            .open_view(trigger_id, &agenda_item_modal(category))
            .await
            .map_err(|error| EventHandlerError::Interaction(error.to_string()))?;
        Ok(None)
    }

    async fn handle_view_submission(
        &self,
        event: &ViewSubmissionEvent,
        ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError> {
        if event.callback_id != AGENDA_MODAL_CALLBACK_ID {
            debug!(callback_id = %event.callback_id, "ignoring unknown view submission");
            return Ok(None);
        }

        let category = AgendaCategory::from_label(&event.private_metadata)
            .unwrap_or(AgendaCategory::OtherBusiness);
        let content = event
            .input_value(AGENDA_CONTENT_BLOCK_ID, AGENDA_CONTENT_ACTION_ID)
            .unwrap_or_default();
        // Modal submissions carry no channel; the item is filed against the
        // submitter's own id.
        let item = NewAgendaItem::new(&event.user_id, &event.user_id, category, content)
            .map_err(|error| EventHandlerError::Interaction(error.to_string()))?;

        let stored = self
            .agenda
            .add(item)
            .await
            .map_err(|error| EventHandlerError::Interaction(error.to_string()))?;
        info!(
            event_name = "pillar.agenda.item_added",
            correlation_id = %ctx.correlation_id,
            item_id = stored.id.0,
            category = stored.category.label(),
            "agenda item added from modal"
        );

        let confirmation = agenda_confirmation_message(stored.category, &stored.content);
        let dm_channel = self
            .gateway
            .open_dm(&event.user_id)
            .await
            .map_err(|error| EventHandlerError::Interaction(error.to_string()))?;
        self.gateway
            .post_message(&dm_channel, &confirmation, None)
            .await
            .map_err(|error| EventHandlerError::Interaction(error.to_string()))?;
        Ok(None)
    }
}
