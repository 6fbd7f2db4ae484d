use crate::agent::apply::ApplyReport;
use crate::agent::context::PageContext;
use crate::agent::picking::{EventOutcome, PointerEvent};
use crate::error::{Error, Result};
use crate::messaging::{Message, PageId, Response, RuntimeEvent};
use log::{debug, error, info, warn};
use tokio::sync::mpsc::UnboundedSender;

/// The per-page agent. Installed at most once per page load; it applies
/// stored overrides, answers pings, and runs picking mode.
#[derive(Debug)]
pub struct PageAgent {
    page: PageId,
    outbox: UnboundedSender<RuntimeEvent>,
}

impl PageAgent {
    /// Install the agent into `context` and announce readiness. A second
    /// install into the same page load is refused.
    pub fn inject(
        page: PageId,
        context: &mut PageContext,
        outbox: UnboundedSender<RuntimeEvent>,
    ) -> Result<Self> {
        if !context.mark_agent_installed() {
            warn!("Rice Cooker already initialized in page {}", page);
            return Err(Error::AlreadyInitialized(page));
        }
        context.document.observe();
        let agent = PageAgent { page, outbox };
        info!("Page agent ready in page {}", page);
        agent.send(Message::ContentScriptReady);
        Ok(agent)
    }

    pub fn page(&self) -> PageId {
        self.page
    }

    /// Handle a message addressed to this page. Only `ping` is answered.
    pub fn handle_message(&self, context: &mut PageContext, message: &Message) -> Option<Response> {
        debug!("Page {} received {}", self.page, message.action());
        match message {
            Message::Ping => Some(Response::ok()),
            Message::LoadStyles => {
                self.apply(context);
                None
            }
            Message::StartSelection => {
                context.session.start(&context.document);
                None
            }
            Message::ContentScriptReady | Message::ElementSelected(_) => None,
        }
    }

    /// Route a pointer event through picking mode, reporting a selection.
    pub fn dispatch_pointer(&self, context: &mut PageContext, event: &PointerEvent) -> EventOutcome {
        let (outcome, selected) =
            context
                .session
                .handle(&context.document, event, &context.settings.highlight);
        if let Some(descriptor) = selected {
            self.send(Message::ElementSelected(descriptor));
        }
        outcome
    }

    /// Drain pending mutation records and, if there were any, re-apply the
    /// store once for the whole batch.
    pub fn process_mutations(&self, context: &mut PageContext) -> Option<ApplyReport> {
        let records = context.document.take_records();
        if records.is_empty() {
            return None;
        }
        debug!(
            "{} mutation record(s) in page {}, re-applying styles",
            records.len(),
            self.page
        );
        self.apply(context)
    }

    /// Page teardown: stop observing and drop picking listeners.
    pub fn unload(self, context: &mut PageContext) {
        context.document.disconnect();
        context.session.stop();
        debug!("Page agent unloaded from page {}", self.page);
    }

    fn apply(&self, context: &PageContext) -> Option<ApplyReport> {
        match context.apply_stored_styles() {
            Ok(report) => Some(report),
            Err(err) => {
                error!("Failed to load stored styles in page {}: {}", self.page, err);
                None
            }
        }
    }

    fn send(&self, message: Message) {
        let event = RuntimeEvent::Message {
            sender: Some(self.page),
            message,
        };
        if self.outbox.send(event).is_err() {
            warn!("Runtime is gone; dropping message from page {}", self.page);
        }
    }
}
