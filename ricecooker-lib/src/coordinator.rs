//! The background coordinator: notices pages finishing loading or agents
//! announcing themselves, waits until the agent answers a ping, then tells it
//! to apply stored overrides.

use crate::browser::ExtensionHost;
use crate::error::Result;
use crate::messaging::{Message, PageId, PageStatus, RuntimeEvent};
use crate::retry::{retry_with_backoff, RetryPolicy};
use log::{debug, error, info};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

pub struct Coordinator {
    host: Rc<dyn ExtensionHost>,
    tracked: RefCell<BTreeSet<PageId>>,
    policy: RetryPolicy,
}

impl Coordinator {
    pub fn new(host: Rc<dyn ExtensionHost>, policy: RetryPolicy) -> Self {
        Coordinator {
            host,
            tracked: RefCell::new(BTreeSet::new()),
            policy,
        }
    }

    /// Pages whose agent has answered a ping and been told to load styles.
    pub fn tracked_pages(&self) -> Vec<PageId> {
        self.tracked.borrow().iter().copied().collect()
    }

    pub fn is_tracked(&self, page: PageId) -> bool {
        self.tracked.borrow().contains(&page)
    }

    pub async fn handle_event(&self, event: &RuntimeEvent) -> Result<()> {
        match event {
            RuntimeEvent::PageUpdated {
                page,
                status: PageStatus::Complete,
                url: Some(_),
            } => self.initialize(*page).await,
            RuntimeEvent::Message {
                sender: Some(page),
                message: Message::ContentScriptReady,
            } => {
                debug!("Content script ready in page {}", page);
                self.initialize(*page).await
            }
            RuntimeEvent::PageRemoved { page } => {
                if self.tracked.borrow_mut().remove(page) {
                    debug!("Stopped tracking page {}", page);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Ping `page` until its agent answers, then track it and send
    /// `loadStyles`. Gives up only on a permanent delivery failure.
    pub async fn initialize(&self, page: PageId) -> Result<()> {
        let pinged = retry_with_backoff(&self.policy, |attempt| {
            if attempt > 1 {
                debug!("Retrying initialization of page {} (attempt {})", page, attempt);
            }
            self.host.send_message(page, Message::Ping)
        })
        .await;

        if let Err(err) = pinged {
            error!("Failed to initialize page {}: {}", page, err);
            self.tracked.borrow_mut().remove(&page);
            return Err(err);
        }

        self.tracked.borrow_mut().insert(page);
        self.host.send_message(page, Message::LoadStyles).await?;
        info!("Initialized page {}", page);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::context::PageScript;
    use crate::error::{DeliveryError, Error};
    use crate::messaging::Response;
    use crate::retry::Backoff;
    use async_trait::async_trait;
    use std::cell::Cell;
    use std::time::Duration;
    use tokio::time::Instant;

    /// A host whose agent starts answering after `failures` pings.
    struct ScriptedHost {
        failures: Cell<u32>,
        closed: bool,
        sent: RefCell<Vec<(Duration, &'static str)>>,
        started: Instant,
    }

    impl ScriptedHost {
        fn new(failures: u32) -> Self {
            ScriptedHost {
                failures: Cell::new(failures),
                closed: false,
                sent: RefCell::new(Vec::new()),
                started: Instant::now(),
            }
        }
    }

    #[async_trait(?Send)]
    impl ExtensionHost for ScriptedHost {
        async fn active_page(&self) -> Result<PageId> {
            Ok(PageId(1))
        }

        async fn send_message(&self, page: PageId, message: Message) -> Result<Option<Response>> {
            self.sent
                .borrow_mut()
                .push((self.started.elapsed(), message.action()));
            if self.closed {
                return Err(DeliveryError::PageClosed(page).into());
            }
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(DeliveryError::NoReceiver(page).into());
            }
            Ok((message == Message::Ping).then(Response::ok))
        }

        async fn execute_script(&self, _page: PageId, _script: PageScript) -> Result<()> {
            Ok(())
        }
    }

    fn coordinator(host: &Rc<ScriptedHost>) -> Coordinator {
        let host: Rc<dyn ExtensionHost> = host.clone();
        Coordinator::new(
            host,
            RetryPolicy::unbounded(Backoff::Fixed(Duration::from_secs(1))),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn pings_until_the_agent_answers_then_loads_once() {
        let host = Rc::new(ScriptedHost::new(3));
        let coordinator = coordinator(&host);
        coordinator
            .handle_event(&RuntimeEvent::PageUpdated {
                page: PageId(4),
                status: PageStatus::Complete,
                url: Some("https://a.test/".into()),
            })
            .await
            .unwrap();

        let sent = host.sent.borrow();
        let secs: Vec<_> = sent.iter().map(|(at, a)| (at.as_secs(), *a)).collect();
        assert_eq!(
            secs,
            vec![
                (0, "ping"),
                (1, "ping"),
                (2, "ping"),
                (3, "ping"),
                (3, "loadStyles")
            ]
        );
        assert!(coordinator.is_tracked(PageId(4)));
    }

    #[tokio::test(start_paused = true)]
    async fn loading_updates_are_ignored() {
        let host = Rc::new(ScriptedHost::new(0));
        let coordinator = coordinator(&host);
        coordinator
            .handle_event(&RuntimeEvent::PageUpdated {
                page: PageId(2),
                status: PageStatus::Loading,
                url: None,
            })
            .await
            .unwrap();
        assert!(host.sent.borrow().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_page_ends_the_retry_loop() {
        let mut host = ScriptedHost::new(0);
        host.closed = true;
        let host = Rc::new(host);
        let coordinator = coordinator(&host);
        let result = coordinator.initialize(PageId(9)).await;
        assert!(matches!(result, Err(Error::Delivery(DeliveryError::PageClosed(_)))));
        assert_eq!(host.sent.borrow().len(), 1);
        assert!(!coordinator.is_tracked(PageId(9)));
    }

    #[tokio::test(start_paused = true)]
    async fn removal_untracks() {
        let host = Rc::new(ScriptedHost::new(0));
        let coordinator = coordinator(&host);
        coordinator
            .handle_event(&RuntimeEvent::Message {
                sender: Some(PageId(3)),
                message: Message::ContentScriptReady,
            })
            .await
            .unwrap();
        assert_eq!(coordinator.tracked_pages(), vec![PageId(3)]);
        coordinator
            .handle_event(&RuntimeEvent::PageRemoved { page: PageId(3) })
            .await
            .unwrap();
        assert!(coordinator.tracked_pages().is_empty());
    }
}
