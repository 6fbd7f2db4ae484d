//! The Control Panel: the popup the user drives. It holds no DOM access of
//! its own; every edit is shipped to the active page as a [`PageScript`].

use crate::agent::context::{PageScript, StyleField};
use crate::browser::ExtensionHost;
use crate::config::Settings;
use crate::error::Result;
use crate::messaging::{Message, SelectedElementDescriptor};
use crate::retry::retry_with_backoff;
use log::{debug, error};
use std::rc::Rc;

/// Ids of the panel's controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlId {
    SelectElement,
    SelectedInfo,
    ElementDetails,
    Style(StyleField),
    ImageControl,
    ImageUrl,
    UpdateImage,
    BackgroundImageUrl,
    BackgroundSize,
    UpdateBackgroundImage,
    RemoveElement,
}

impl ControlId {
    pub fn id(&self) -> &'static str {
        match self {
            ControlId::SelectElement => "selectElement",
            ControlId::SelectedInfo => "selectedInfo",
            ControlId::ElementDetails => "elementDetails",
            ControlId::Style(field) => field.control_id(),
            ControlId::ImageControl => "imageControl",
            ControlId::ImageUrl => "imageUrl",
            ControlId::UpdateImage => "updateImage",
            ControlId::BackgroundImageUrl => "bgImageUrl",
            ControlId::BackgroundSize => "bgSize",
            ControlId::UpdateBackgroundImage => "updateBgImage",
            ControlId::RemoveElement => "removeElement",
        }
    }
}

/// What the panel currently shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelView {
    pub element_details: String,
    pub selected_info_visible: bool,
    pub remove_visible: bool,
    pub image_control_visible: bool,
    /// A blocking alert waiting to be dismissed.
    pub alert: Option<String>,
}

impl PanelView {
    pub fn is_visible(&self, control: ControlId) -> bool {
        match control {
            ControlId::SelectedInfo | ControlId::ElementDetails => self.selected_info_visible,
            ControlId::RemoveElement => self.remove_visible,
            ControlId::ImageControl | ControlId::ImageUrl | ControlId::UpdateImage => {
                self.image_control_visible
            }
            _ => true,
        }
    }
}

pub struct ControlPanel {
    host: Rc<dyn ExtensionHost>,
    settings: Rc<Settings>,
    view: PanelView,
    selected: Option<SelectedElementDescriptor>,
}

impl ControlPanel {
    /// Open the panel and re-apply stored overrides on the active page.
    /// A failure there is logged; the panel still opens.
    pub async fn open(host: Rc<dyn ExtensionHost>, settings: Rc<Settings>) -> Self {
        let panel = ControlPanel {
            host,
            settings,
            view: PanelView::default(),
            selected: None,
        };
        if let Err(err) = panel.run(PageScript::ApplyStoredStyles).await {
            error!("Failed to load stored styles: {}", err);
        }
        panel
    }

    pub fn view(&self) -> &PanelView {
        &self.view
    }

    pub fn selected(&self) -> Option<&SelectedElementDescriptor> {
        self.selected.as_ref()
    }

    pub fn dismiss_alert(&mut self) -> Option<String> {
        self.view.alert.take()
    }

    /// Ask the active page to enter picking mode. Retries while its agent is
    /// not yet listening; after the last failure the user is told to refresh.
    pub async fn select_element(&mut self) -> Result<()> {
        let page = self.host.active_page().await?;
        let host = &self.host;
        let sent = retry_with_backoff(&self.settings.panel_retry_policy(), |attempt| {
            debug!("Sending startSelection to page {} (attempt {})", page, attempt);
            host.send_message(page, Message::StartSelection)
        })
        .await;

        match sent {
            Ok(_) => Ok(()),
            Err(err) => {
                error!("Failed to send message after retries: {}", err);
                self.view.alert = Some(self.settings.failure_alert.clone());
                Err(err)
            }
        }
    }

    /// Runtime messages addressed to the panel.
    pub fn handle_message(&mut self, message: &Message) {
        if let Message::ElementSelected(descriptor) = message {
            self.view.selected_info_visible = true;
            self.view.remove_visible = true;
            self.view.element_details = descriptor.label();
            self.view.image_control_visible = descriptor.is_image();
            self.selected = Some(descriptor.clone());
        }
    }

    pub async fn change_style(&mut self, field: StyleField, value: &str) -> Result<()> {
        self.run(PageScript::UpdateStyle {
            field,
            value: value.to_string(),
        })
        .await
    }

    pub async fn update_image(&mut self, url: &str) -> Result<()> {
        self.run(PageScript::UpdateImageSource {
            url: url.to_string(),
        })
        .await
    }

    pub async fn update_background_image(&mut self, url: &str, size: &str) -> Result<()> {
        self.run(PageScript::UpdateBackgroundImage {
            url: url.to_string(),
            size: size.to_string(),
        })
        .await
    }

    pub async fn remove_element(&mut self) -> Result<()> {
        self.run(PageScript::RemoveSelectedElement).await?;
        self.view.selected_info_visible = false;
        self.view.remove_visible = false;
        self.view.image_control_visible = false;
        self.selected = None;
        Ok(())
    }

    async fn run(&self, script: PageScript) -> Result<()> {
        let page = self.host.active_page().await?;
        self.host.execute_script(page, script).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_ids() {
        assert_eq!(ControlId::Style(StyleField::BackgroundColor).id(), "bgColor");
        assert_eq!(ControlId::BackgroundImageUrl.id(), "bgImageUrl");
        assert_eq!(ControlId::RemoveElement.id(), "removeElement");
    }

    #[test]
    fn hidden_controls_follow_selection_state() {
        let view = PanelView::default();
        assert!(!view.is_visible(ControlId::SelectedInfo));
        assert!(!view.is_visible(ControlId::ImageControl));
        assert!(view.is_visible(ControlId::SelectElement));
    }
}
