use crate::browser::{Browser, ExtensionHost};
use crate::config::Settings;
use crate::coordinator::Coordinator;
use crate::messaging::{Message, RuntimeEvent};
use crate::panel::ControlPanel;
use crate::store::StorageArea;
use log::{debug, warn};
use std::rc::Rc;
use tokio::sync::mpsc::UnboundedReceiver;

/// Wires a [`Browser`], the [`Coordinator`] and an optional [`ControlPanel`]
/// to one event bus.
pub struct ExtensionRuntime {
    browser: Rc<Browser>,
    coordinator: Rc<Coordinator>,
    settings: Rc<Settings>,
    panel: Option<ControlPanel>,
    events: UnboundedReceiver<RuntimeEvent>,
}

impl ExtensionRuntime {
    pub fn new(storage: Rc<dyn StorageArea>, settings: Settings) -> Self {
        let settings = Rc::new(settings);
        let (browser, events) = Browser::new(storage, Rc::clone(&settings));
        let browser = Rc::new(browser);
        let host: Rc<dyn ExtensionHost> = browser.clone();
        let coordinator = Coordinator::new(host, settings.coordinator_retry_policy());
        ExtensionRuntime {
            browser,
            coordinator: Rc::new(coordinator),
            settings,
            panel: None,
            events,
        }
    }

    pub fn browser(&self) -> Rc<Browser> {
        Rc::clone(&self.browser)
    }

    pub fn coordinator(&self) -> Rc<Coordinator> {
        Rc::clone(&self.coordinator)
    }

    /// Open the Control Panel over the active page.
    pub async fn open_panel(&mut self) -> &mut ControlPanel {
        let host: Rc<dyn ExtensionHost> = self.browser.clone();
        let panel = ControlPanel::open(host, Rc::clone(&self.settings)).await;
        self.panel.insert(panel)
    }

    pub fn panel(&mut self) -> Option<&mut ControlPanel> {
        self.panel.as_mut()
    }

    /// Closing the popup drops its state; messages for it are then lost.
    pub fn close_panel(&mut self) {
        self.panel = None;
    }

    /// Route every queued event. Coordinator work runs as local tasks, so
    /// this must be called inside a `tokio::task::LocalSet`. Returns the
    /// number of events routed.
    pub fn pump(&mut self) -> usize {
        let mut routed = 0;
        while let Ok(event) = self.events.try_recv() {
            routed += 1;
            self.route(event);
        }
        routed
    }

    fn route(&mut self, event: RuntimeEvent) {
        if let RuntimeEvent::Message {
            message: message @ Message::ElementSelected(_),
            ..
        } = &event
        {
            match self.panel.as_mut() {
                Some(panel) => panel.handle_message(message),
                None => debug!("Panel closed; dropping {}", message.action()),
            }
            return;
        }

        let coordinator = Rc::clone(&self.coordinator);
        tokio::task::spawn_local(async move {
            if let Err(err) = coordinator.handle_event(&event).await {
                warn!("Coordinator gave up on {:?}: {}", event, err);
            }
        });
    }
}
