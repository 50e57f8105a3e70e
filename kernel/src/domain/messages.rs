use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub param: Option<String>,
}

/// Ordered user-facing messages attached to a response or carried as flash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Messages {
    messages: Vec<Message>,
}

impl Messages {
    pub fn append(&mut self, kind: &str, message: impl Into<String>, param: Option<&str>) -> &mut Self {
        self.messages.push(Message {
            kind: kind.to_string(),
            message: message.into(),
            param: param.map(str::to_string),
        });
        self
    }

    pub fn info(&mut self, message: impl Into<String>, param: Option<&str>) -> &mut Self {
        self.append("info", message, param)
    }

    pub fn warning(&mut self, message: impl Into<String>, param: Option<&str>) -> &mut Self {
        self.append("warning", message, param)
    }

    pub fn danger(&mut self, message: impl Into<String>, param: Option<&str>) -> &mut Self {
        self.append("danger", message, param)
    }

    pub fn success(&mut self, message: impl Into<String>, param: Option<&str>) -> &mut Self {
        self.append("success", message, param)
    }

    pub fn primary(&mut self, message: impl Into<String>, param: Option<&str>) -> &mut Self {
        self.append("primary", message, param)
    }

    pub fn secondary(&mut self, message: impl Into<String>, param: Option<&str>) -> &mut Self {
        self.append("secondary", message, param)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }
}
