use serde_json::Value;

/// One inbound platform event.
///
/// Connectors keep the untouched platform payload in `raw` and lift out the
/// parts dispatch needs: whether it carries a message, its text, and a
/// postback payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    pub raw: Value,
    pub message: Option<Value>,
    pub text: Option<String>,
    pub payload: Option<String>,
}

impl Event {
    pub fn new(raw: Value) -> Self {
        Self {
            raw,
            ..Default::default()
        }
    }

    /// A text message event.
    pub fn text(raw: Value, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            raw,
            message: Some(serde_json::json!({ "text": text })),
            text: Some(text),
            payload: None,
        }
    }

    /// A postback event carrying `payload`.
    pub fn payload(raw: Value, payload: impl Into<String>) -> Self {
        Self {
            raw,
            message: None,
            text: None,
            payload: Some(payload.into()),
        }
    }

    pub fn is_message(&self) -> bool {
        self.message.is_some()
    }

    /// Text messages are the only events that wait in a debounce window.
    pub fn is_text(&self) -> bool {
        self.is_message() && self.text.is_some()
    }

    pub fn is_payload(&self) -> bool {
        self.payload.is_some()
    }
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn classification() {
        let text = Event::text(json!({}), "hi");
        assert!(text.is_message() && text.is_text() && !text.is_payload());

        let payload = Event::payload(json!({}), "GET_STARTED");
        assert!(!payload.is_message() && !payload.is_text() && payload.is_payload());

        let sticker = Event {
            message: Some(json!({"sticker": 1})),
            ..Event::new(json!({}))
        };
        assert!(sticker.is_message() && !sticker.is_text());
    }
}
