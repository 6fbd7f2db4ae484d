//! Point-to-point messages between the Page Agent and the extension surfaces.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one page (tab) in the host browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(pub u32);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the picked element, as shown in the Control Panel inspector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedElementDescriptor {
    /// Uppercase DOM tag name, e.g. "IMG".
    pub tag_name: String,
    /// Raw class attribute.
    pub class_name: String,
    pub id: String,
}

impl SelectedElementDescriptor {
    pub fn is_image(&self) -> bool {
        self.tag_name.eq_ignore_ascii_case("img")
    }

    /// `tag#id.class`, omitting empty parts.
    pub fn label(&self) -> String {
        let mut label = self.tag_name.to_ascii_lowercase();
        if !self.id.is_empty() {
            label.push('#');
            label.push_str(&self.id);
        }
        if !self.class_name.is_empty() {
            label.push('.');
            label.push_str(&self.class_name);
        }
        label
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Message {
    /// Agent -> Coordinator, once per page load.
    ContentScriptReady,
    /// Coordinator -> Agent liveness check.
    Ping,
    /// Re-apply every stored override.
    LoadStyles,
    /// Panel -> Agent: enter picking mode.
    StartSelection,
    /// Agent -> Panel: the user clicked an element while picking.
    ElementSelected(SelectedElementDescriptor),
}

impl Message {
    pub fn action(&self) -> &'static str {
        match self {
            Message::ContentScriptReady => "contentScriptReady",
            Message::Ping => "ping",
            Message::LoadStyles => "loadStyles",
            Message::StartSelection => "startSelection",
            Message::ElementSelected(_) => "elementSelected",
        }
    }
}

/// Reply to a ping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: String,
}

impl Response {
    pub fn ok() -> Self {
        Response {
            status: "ok".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    Loading,
    Complete,
}

/// Everything the host runtime delivers to extension-side listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// A runtime message; `sender` is set when it came from a page.
    Message {
        sender: Option<PageId>,
        message: Message,
    },
    PageUpdated {
        page: PageId,
        status: PageStatus,
        url: Option<String>,
    },
    PageRemoved {
        page: PageId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn messages_use_action_tag() {
        assert_eq!(serde_json::to_value(Message::Ping).unwrap(), json!({"action": "ping"}));
        assert_eq!(
            serde_json::to_value(Message::ContentScriptReady).unwrap(),
            json!({"action": "contentScriptReady"})
        );
        let selected = Message::ElementSelected(SelectedElementDescriptor {
            tag_name: "IMG".into(),
            class_name: "hero big".into(),
            id: "logo".into(),
        });
        let value = serde_json::to_value(&selected).unwrap();
        assert_eq!(
            value,
            json!({"action": "elementSelected", "tagName": "IMG", "className": "hero big", "id": "logo"})
        );
        assert_eq!(serde_json::from_value::<Message>(value).unwrap(), selected);
        assert_eq!(selected.action(), "elementSelected");
    }

    #[test]
    fn ping_response_shape() {
        assert_eq!(serde_json::to_value(Response::ok()).unwrap(), json!({"status": "ok"}));
    }

    #[test]
    fn descriptor_label() {
        let d = SelectedElementDescriptor {
            tag_name: "DIV".into(),
            class_name: "card wide".into(),
            id: "".into(),
        };
        assert_eq!(d.label(), "div.card wide");
        assert!(!d.is_image());
    }
}
