use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use pillar_agent::{AgentContext, StatusSink};
use pillar_core::period::parse_time_period;
use pillar_core::text::{extract_urls, push_unique, strip_mentions};
use pillar_slack::blocks::answer_message;
use pillar_slack::events::AppMentionEvent;
use pillar_slack::{ChatGateway, EventContext, EventHandlerError, MentionService, MessageTemplate};

use super::{PillarService, ServiceError};

pub(crate) const GREETING: &str = "Hey! I'm the Pillar VC bot. Ask me to summarize this channel, \
     analyze a file, fetch a link, find action items, or research something.";
pub(crate) const MENTION_FAILED: &str = "Sorry, something went wrong. Try again?";
const THINKING: &str = "_Thinking..._";

/// Requests answered without the model choosing tools.
#[derive(Debug, PartialEq, Eq)]
enum MentionIntent {
    Summarize { hours: u32 },
    Catchup,
}

/// Fast-path intent for a mention. Mentions carrying files, links or a thread
/// parent always go to the agent, which can read them.
fn fast_path_intent(
    event: &AppMentionEvent,
    request: &str,
    default_hours: u32,
) -> Option<MentionIntent> {
    let carries_context = !event.files.is_empty()
        || event.is_thread_reply()
        || !extract_urls(&event.text).is_empty();
    if carries_context {
        return None;
    }
    mention_intent(request, default_hours)
}

fn mention_intent(request: &str, default_hours: u32) -> Option<MentionIntent> {
    let lowered = request.trim().to_lowercase();
    let first_word: String = lowered.chars().take_while(|c| c.is_alphanumeric()).collect();

    if matches!(first_word.as_str(), "summarize" | "summarise" | "summary") {
        let hours = parse_time_period(&lowered).unwrap_or(default_hours);
        return Some(MentionIntent::Summarize { hours });
    }
    if lowered.starts_with("catch me up") || first_word == "catchup" {
        return Some(MentionIntent::Catchup);
    }
    None
}

/// Posts agent progress into the mention's thread.
struct ThreadStatus {
    gateway: Arc<dyn ChatGateway>,
    channel_id: String,
    thread_ts: String,
}

#[async_trait]
impl StatusSink for ThreadStatus {
    async fn status(&self, message: &str) {
        let template = MessageTemplate::text(message);
        if let Err(error) =
            self.gateway.post_message(&self.channel_id, &template, Some(&self.thread_ts)).await
        {
            warn!(channel_id = %self.channel_id, error = %error, "could not post agent status");
        }
    }
}

impl PillarService {
    /// Files, parent-message text and URLs the model should know about.
    async fn mention_context(&self, event: &AppMentionEvent) -> AgentContext {
        let mut context =
            AgentContext::new(&event.channel_id, &event.user_id, self.agent_services.clone());
        context.files = event.files.clone();

        if event.is_thread_reply() {
            let parent =
                match self.gateway.thread_parent(&event.channel_id, event.reply_thread_ts()).await {
                    Ok(parent) => parent,
                    Err(error) => {
                        warn!(channel_id = %event.channel_id, error = %error, "thread parent lookup failed");
                        None
                    }
                };

            if let Some(parent) = parent {
                if context.files.is_empty() {
                    context.files = parent.files;
                }
                if !parent.text.trim().is_empty() {
                    context.urls = extract_urls(&parent.text);
                    context.parent_message = Some(parent.text);
                }
            }
        }

        for url in extract_urls(&event.text) {
            push_unique(&mut context.urls, &url);
        }
        context
    }

    async fn run_agent(
        &self,
        request: &str,
        event: &AppMentionEvent,
        ctx: &EventContext,
    ) -> Result<String, ServiceError> {
        let thread_ts = event.reply_thread_ts();
        self.gateway
            .post_message(&event.channel_id, &MessageTemplate::text(THINKING), Some(thread_ts))
            .await?;

        let mut context = self.mention_context(event).await;
        let status = ThreadStatus {
            gateway: self.gateway.clone(),
            channel_id: event.channel_id.clone(),
            thread_ts: thread_ts.to_string(),
        };

        let answer = self.agent.run(request, &mut context, Some(&status)).await?;
        info!(
            event_name = "pillar.mention.answered",
            correlation_id = %ctx.correlation_id,
            channel_id = %event.channel_id,
            files = context.files.len(),
            urls = context.urls.len(),
            "mention answered"
        );
        Ok(answer)
    }
}

#[async_trait]
impl MentionService for PillarService {
    async fn handle_mention(
        &self,
        event: &AppMentionEvent,
        ctx: &EventContext,
    ) -> Result<Option<MessageTemplate>, EventHandlerError> {
        let request = strip_mentions(&event.text);
        if request.is_empty() {
            return Ok(Some(MessageTemplate::text(GREETING)));
        }

        let default_hours = self.portfolio.default_lookback_hours;
        let outcome = match fast_path_intent(event, &request, default_hours) {
            Some(MentionIntent::Summarize { hours }) => {
                self.summarize_channel(&event.channel_id, &event.user_id, hours).await
            }
            Some(MentionIntent::Catchup) => {
                self.catch_up(&event.channel_id, &event.user_id).await
            }
            None => match self.run_agent(&request, event, ctx).await {
                Ok(answer) => {
                    self.touch_user(&event.user_id).await;
                    Ok(answer_message(&answer))
                }
                Err(failure) => Err(failure),
            },
        };

        match outcome {
            Ok(reply) => Ok(Some(reply)),
            Err(failure) => {
                error!(
                    event_name = "pillar.mention.failed",
                    correlation_id = %ctx.correlation_id,
                    channel_id = %event.channel_id,
                    error = %failure,
                    "mention handling failed"
                );
                Ok(Some(MessageTemplate::text(MENTION_FAILED)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pillar_core::domain::chat::ChatFile;
    use pillar_slack::events::AppMentionEvent;
    use pillar_slack::{EventContext, MentionService};

    use super::{fast_path_intent, mention_intent, MentionIntent, GREETING};
    use crate::services::testing::{message, FakeSlack, HarnessBuilder, QueuedLlm};
    use crate::services::NO_MESSAGES;

    fn mention(text: &str, thread_ts: Option<&str>) -> AppMentionEvent {
        AppMentionEvent {
            channel_id: "C1".to_string(),
            user_id: "U1".to_string(),
            text: text.to_string(),
            ts: "1700000100.000200".to_string(),
            thread_ts: thread_ts.map(str::to_string),
            files: Vec::new(),
        }
    }

    #[test]
    fn fast_path_intents() {
        assert_eq!(
            mention_intent("summarize the last 3 days", 24),
            Some(MentionIntent::Summarize { hours: 72 })
        );
        assert_eq!(mention_intent("Summary, please", 24), Some(MentionIntent::Summarize { hours: 24 }));
        assert_eq!(mention_intent("catch me up", 24), Some(MentionIntent::Catchup));
        assert_eq!(mention_intent("what did we summarize?", 24), None);
    }

    #[test]
    fn attachments_links_and_threads_bypass_the_fast_path() {
        let plain = mention("<@UBOT> summarize today", None);
        assert_eq!(
            fast_path_intent(&plain, "summarize today", 24),
            Some(MentionIntent::Summarize { hours: 24 })
        );

        let linked = mention("<@UBOT> summarize https://acme.test/post", None);
        assert_eq!(fast_path_intent(&linked, "summarize https://acme.test/post", 24), None);

        let threaded = mention("<@UBOT> catch me up", Some("1700000000.000100"));
        assert_eq!(fast_path_intent(&threaded, "catch me up", 24), None);
    }

    #[tokio::test]
    async fn summarize_requests_with_a_link_and_file_reach_the_agent() {
        let harness =
            HarnessBuilder::new(FakeSlack::default().with_channel("C1", "general", Vec::new()))
                .llm(QueuedLlm::answering(&["The article covers Acme's new fund."]))
                .build();
        let mut event = mention("<@UBOT> summarize this article https://acme.test/post", None);
        event.files = vec![ChatFile {
            id: "F9".to_string(),
            name: "memo.pdf".to_string(),
            ..ChatFile::default()
        }];

        let reply = harness
            .service
            .handle_mention(&event, &EventContext::default())
            .await
            .expect("reply")
            .expect("message");

        assert_eq!(harness.llm.call_count(), 1);
        assert_eq!(reply.visible_text(), "The article covers Acme's new fund.");
        assert!(!reply.visible_text().contains(NO_MESSAGES));
        let prompt = harness.llm.prompt_text(0);
        assert!(prompt.contains("https://acme.test/post"));
        assert!(prompt.contains("memo.pdf"));
    }

    #[tokio::test]
    async fn bare_mention_gets_the_greeting() {
        let harness = HarnessBuilder::new(FakeSlack::default()).build();

        let reply = harness
            .service
            .handle_mention(&mention("<@UBOT>", None), &EventContext::default())
            .await
            .expect("reply")
            .expect("message");

        assert_eq!(reply.visible_text(), GREETING);
        assert_eq!(harness.llm.call_count(), 0);
    }

    #[tokio::test]
    async fn summarize_mention_with_no_messages_uses_the_fixed_reply() {
        let harness =
            HarnessBuilder::new(FakeSlack::default().with_channel("C1", "general", Vec::new()))
                .build();

        let reply = harness
            .service
            .handle_mention(&mention("<@UBOT> summarize the last 3 days", None), &EventContext::default())
            .await
            .expect("reply")
            .expect("message");

        assert!(reply.visible_text().contains(NO_MESSAGES));
        assert_eq!(harness.llm.call_count(), 0);
        assert!(harness.slack.posted().is_empty());
    }

    #[tokio::test]
    async fn free_form_mentions_run_the_agent_in_the_thread() {
        let harness = HarnessBuilder::new(FakeSlack::default())
            .llm(QueuedLlm::answering(&["**Acme** raised a Series B."]))
            .build();

        let reply = harness
            .service
            .handle_mention(
                &mention("<@UBOT> what happened with Acme? see https://acme.test/news", None),
                &EventContext::default(),
            )
            .await
            .expect("reply")
            .expect("message");

        assert_eq!(reply.visible_text(), "*Acme* raised a Series B.");
        let posted = harness.slack.posted();
        assert_eq!(posted[0].text, "_Thinking..._");
        assert_eq!(posted[0].thread_ts.as_deref(), Some("1700000100.000200"));
        assert!(harness.llm.prompt_text(0).contains("https://acme.test/news"));
    }

    #[tokio::test]
    async fn thread_replies_inherit_parent_text_and_files() {
        let mut parent = message("Ana", "Deck for <https://nimbus.test|Nimbus>", 30);
        parent.files = vec![ChatFile {
            id: "F1".to_string(),
            name: "nimbus-deck.pdf".to_string(),
            ..ChatFile::default()
        }];
        let mut slack = FakeSlack::default();
        slack.parents.insert("1700000000.000100".to_string(), parent);
        let harness = HarnessBuilder::new(slack).build();

        let context = harness
            .service
            .mention_context(&mention("<@UBOT> thoughts?", Some("1700000000.000100")))
            .await;

        assert_eq!(context.files.len(), 1);
        assert_eq!(context.urls, vec!["https://nimbus.test".to_string()]);
        assert!(context.parent_message.as_deref().is_some_and(|text| text.starts_with("Deck for")));
    }
}
