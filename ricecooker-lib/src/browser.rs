//! An in-process host runtime: pages with documents, the message bus, and
//! script injection. The Coordinator and Control Panel only see it through
//! [`ExtensionHost`].

use crate::agent::context::{PageContext, PageScript};
use crate::agent::page_agent::PageAgent;
use crate::agent::picking::{EventOutcome, PointerEvent};
use crate::config::Settings;
use crate::dom::dom_tree::{Document, NodeRef};
use crate::error::{DeliveryError, Error, Result};
use crate::messaging::{Message, PageId, PageStatus, Response, RuntimeEvent};
use crate::parser::html::{create_dom_tree, serialize_document};
use crate::store::StorageArea;
use crate::style::selector::query_selector_all;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// What the extension surfaces need from the host browser.
#[async_trait(?Send)]
pub trait ExtensionHost {
    /// The page the user is looking at.
    async fn active_page(&self) -> Result<PageId>;

    /// Deliver `message` to the Page Agent of `page`. Fails with
    /// [`DeliveryError::NoReceiver`] while no agent is listening.
    async fn send_message(&self, page: PageId, message: Message) -> Result<Option<Response>>;

    /// Run `script` in the script context of `page`.
    async fn execute_script(&self, page: PageId, script: PageScript) -> Result<()>;
}

struct Page {
    url: String,
    status: PageStatus,
    context: PageContext,
    agent: Option<PageAgent>,
}

impl Page {
    /// Let the agent react to whatever the last operation did to the DOM.
    fn settle(&mut self) {
        if let Some(agent) = &self.agent {
            agent.process_mutations(&mut self.context);
        }
    }
}

pub struct Browser {
    pages: RefCell<BTreeMap<PageId, Page>>,
    active: Cell<Option<PageId>>,
    next_id: Cell<u32>,
    storage: Rc<dyn StorageArea>,
    settings: Rc<Settings>,
    events: UnboundedSender<RuntimeEvent>,
}

impl Browser {
    /// A browser with no pages, plus the receiving end of its event bus.
    pub fn new(
        storage: Rc<dyn StorageArea>,
        settings: Rc<Settings>,
    ) -> (Self, UnboundedReceiver<RuntimeEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let browser = Browser {
            pages: RefCell::new(BTreeMap::new()),
            active: Cell::new(None),
            next_id: Cell::new(1),
            storage,
            settings,
            events,
        };
        (browser, receiver)
    }

    pub fn storage(&self) -> Rc<dyn StorageArea> {
        Rc::clone(&self.storage)
    }

    pub fn settings(&self) -> Rc<Settings> {
        Rc::clone(&self.settings)
    }

    /// Start loading `html` in a new page, which becomes active.
    pub fn open_page(&self, url: &str, html: &str) -> PageId {
        let page = PageId(self.next_id.get());
        self.next_id.set(page.0 + 1);
        let context = PageContext::new(
            create_dom_tree(html),
            Rc::clone(&self.storage),
            Rc::clone(&self.settings),
        );
        self.pages.borrow_mut().insert(
            page,
            Page {
                url: url.to_string(),
                status: PageStatus::Loading,
                context,
                agent: None,
            },
        );
        self.active.set(Some(page));
        info!("Opened page {} at {}", page, url);
        self.emit(RuntimeEvent::PageUpdated {
            page,
            status: PageStatus::Loading,
            url: None,
        });
        page
    }

    /// Run the Page Agent injection in `page`.
    pub fn inject_agent(&self, page: PageId) -> Result<()> {
        let mut pages = self.pages.borrow_mut();
        let entry = pages.get_mut(&page).ok_or(DeliveryError::PageClosed(page))?;
        let agent = PageAgent::inject(page, &mut entry.context, self.events.clone())?;
        entry.agent = Some(agent);
        Ok(())
    }

    /// Finish loading `page` and report it complete.
    pub fn complete_navigation(&self, page: PageId) -> Result<()> {
        let url = {
            let mut pages = self.pages.borrow_mut();
            let entry = pages.get_mut(&page).ok_or(DeliveryError::PageClosed(page))?;
            entry.status = PageStatus::Complete;
            entry.url.clone()
        };
        self.emit(RuntimeEvent::PageUpdated {
            page,
            status: PageStatus::Complete,
            url: Some(url),
        });
        Ok(())
    }

    /// Open, inject the agent, and complete: an ordinary page visit.
    pub fn visit(&self, url: &str, html: &str) -> Result<PageId> {
        let page = self.open_page(url, html);
        self.inject_agent(page)?;
        self.complete_navigation(page)?;
        Ok(page)
    }

    /// Navigate `page` to a new document. The old agent unloads and a new
    /// one must be injected.
    pub fn navigate(&self, page: PageId, url: &str, html: &str) -> Result<()> {
        {
            let mut pages = self.pages.borrow_mut();
            let entry = pages.get_mut(&page).ok_or(DeliveryError::PageClosed(page))?;
            if let Some(agent) = entry.agent.take() {
                agent.unload(&mut entry.context);
            }
            entry.context = PageContext::new(
                create_dom_tree(html),
                Rc::clone(&self.storage),
                Rc::clone(&self.settings),
            );
            entry.url = url.to_string();
            entry.status = PageStatus::Loading;
        }
        self.emit(RuntimeEvent::PageUpdated {
            page,
            status: PageStatus::Loading,
            url: Some(url.to_string()),
        });
        Ok(())
    }

    pub fn close_page(&self, page: PageId) -> Result<()> {
        let Page {
            mut context, agent, ..
        } = self
            .pages
            .borrow_mut()
            .remove(&page)
            .ok_or(DeliveryError::PageClosed(page))?;
        if let Some(agent) = agent {
            agent.unload(&mut context);
        }
        if self.active.get() == Some(page) {
            self.active.set(None);
        }
        info!("Closed page {}", page);
        self.emit(RuntimeEvent::PageRemoved { page });
        Ok(())
    }

    pub fn activate(&self, page: PageId) -> Result<()> {
        if !self.pages.borrow().contains_key(&page) {
            return Err(DeliveryError::PageClosed(page).into());
        }
        self.active.set(Some(page));
        Ok(())
    }

    pub fn page_ids(&self) -> Vec<PageId> {
        self.pages.borrow().keys().copied().collect()
    }

    pub fn status(&self, page: PageId) -> Option<PageStatus> {
        self.pages.borrow().get(&page).map(|p| p.status)
    }

    /// Elements of `page` matching `selector`.
    pub fn query(&self, page: PageId, selector: &str) -> Result<Vec<NodeRef>> {
        self.with_document(page, |document| query_selector_all(document, selector))?
            .map_err(Error::from)
    }

    /// Run `f` against the page context, then let the agent observe any
    /// DOM changes it made.
    pub fn with_context<R>(&self, page: PageId, f: impl FnOnce(&mut PageContext) -> R) -> Result<R> {
        let mut pages = self.pages.borrow_mut();
        let entry = pages.get_mut(&page).ok_or(DeliveryError::PageClosed(page))?;
        let result = f(&mut entry.context);
        entry.settle();
        Ok(result)
    }

    /// Page-side script mutating the document (not the agent).
    pub fn with_document<R>(&self, page: PageId, f: impl FnOnce(&Document) -> R) -> Result<R> {
        self.with_context(page, |context| f(&context.document))
    }

    /// Deliver a pointer event on `page`. Without an agent nothing intercepts it.
    pub fn dispatch_pointer(&self, page: PageId, event: PointerEvent) -> Result<EventOutcome> {
        let mut pages = self.pages.borrow_mut();
        let Page { context, agent, .. } =
            pages.get_mut(&page).ok_or(DeliveryError::PageClosed(page))?;
        Ok(match agent {
            Some(agent) => agent.dispatch_pointer(context, &event),
            None => EventOutcome::default(),
        })
    }

    /// The page's current markup, inline styles included.
    pub fn html(&self, page: PageId) -> Result<String> {
        self.with_document(page, serialize_document)
    }

    fn emit(&self, event: RuntimeEvent) {
        if self.events.send(event).is_err() {
            warn!("No runtime listening for browser events");
        }
    }
}

#[async_trait(?Send)]
impl ExtensionHost for Browser {
    async fn active_page(&self) -> Result<PageId> {
        self.active
            .get()
            .ok_or_else(|| DeliveryError::NoActivePage.into())
    }

    async fn send_message(&self, page: PageId, message: Message) -> Result<Option<Response>> {
        let mut pages = self.pages.borrow_mut();
        let entry = pages.get_mut(&page).ok_or(DeliveryError::PageClosed(page))?;
        let Some(agent) = &entry.agent else {
            debug!("No receiver for {} in page {}", message.action(), page);
            return Err(DeliveryError::NoReceiver(page).into());
        };
        let response = agent.handle_message(&mut entry.context, &message);
        entry.settle();
        Ok(response)
    }

    async fn execute_script(&self, page: PageId, script: PageScript) -> Result<()> {
        let mut pages = self.pages.borrow_mut();
        let entry = pages.get_mut(&page).ok_or(DeliveryError::PageClosed(page))?;
        let result = entry.context.run_script(&script);
        entry.settle();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStorage;

    fn browser() -> (Browser, UnboundedReceiver<RuntimeEvent>) {
        Browser::new(Rc::new(MemoryStorage::new()), Rc::new(Settings::default()))
    }

    #[tokio::test]
    async fn messages_need_an_agent() {
        let (browser, mut events) = browser();
        let page = browser.open_page("https://a.test/", "<p>x</p>");
        assert!(matches!(
            browser.send_message(page, Message::Ping).await,
            Err(Error::Delivery(DeliveryError::NoReceiver(p))) if p == page
        ));

        browser.inject_agent(page).unwrap();
        assert_eq!(
            browser.send_message(page, Message::Ping).await.unwrap(),
            Some(Response::ok())
        );

        assert!(matches!(
            events.try_recv().unwrap(),
            RuntimeEvent::PageUpdated { status: PageStatus::Loading, .. }
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            RuntimeEvent::Message { message: Message::ContentScriptReady, .. }
        ));
    }

    #[tokio::test]
    async fn closed_pages_reject_delivery() {
        let (browser, _events) = browser();
        let page = browser.visit("https://a.test/", "<p>x</p>").unwrap();
        browser.close_page(page).unwrap();
        assert!(matches!(
            browser.send_message(page, Message::Ping).await,
            Err(Error::Delivery(DeliveryError::PageClosed(_)))
        ));
        assert!(matches!(
            browser.active_page().await,
            Err(Error::Delivery(DeliveryError::NoActivePage))
        ));
    }

    #[tokio::test]
    async fn activate_switches_the_target_page() {
        let (browser, _events) = browser();
        let first = browser.open_page("https://a.test/", "<p>a</p>");
        let second = browser.open_page("https://b.test/", "<p>b</p>");
        assert_eq!(browser.page_ids(), vec![first, second]);
        assert_eq!(browser.active_page().await.unwrap(), second);

        browser.activate(first).unwrap();
        assert_eq!(browser.active_page().await.unwrap(), first);

        browser.close_page(second).unwrap();
        assert_eq!(browser.page_ids(), vec![first]);
        assert!(matches!(
            browser.activate(second),
            Err(Error::Delivery(DeliveryError::PageClosed(p))) if p == second
        ));
        assert_eq!(browser.active_page().await.unwrap(), first);
    }

    #[test]
    fn navigation_replaces_the_agent() {
        let (browser, _events) = browser();
        let page = browser.visit("https://a.test/", "<p>x</p>").unwrap();
        browser.navigate(page, "https://a.test/next", "<p>y</p>").unwrap();
        assert_eq!(browser.status(page), Some(PageStatus::Loading));
        assert!(browser.inject_agent(page).is_ok());
        assert!(matches!(
            browser.inject_agent(page),
            Err(Error::AlreadyInitialized(_))
        ));
    }
}
