use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorLevel {
    Notice,
    Warning,
    Deprecated,
}

impl ErrorLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorLevel::Notice => "Notice",
            ErrorLevel::Warning => "Warning",
            ErrorLevel::Deprecated => "Deprecated",
        }
    }
}

impl std::fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single captured run-time error.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorMsg {
    #[serde(rename = "type")]
    pub level: ErrorLevel,
    pub message: String,
    pub file: String,
    pub line: u32,
    pub triggered: bool,
    #[serde(rename = "timeStamp")]
    pub timestamp: f64,
}

impl ErrorMsg {
    pub fn new(level: ErrorLevel, message: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            level,
            message: message.into(),
            file: String::new(),
            line: 0,
            triggered: false,
            timestamp: now.timestamp_micros() as f64 / 1_000_000.0,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ErrorList {
    errors: Vec<ErrorMsg>,
}

impl ErrorList {
    pub fn append(&mut self, error: ErrorMsg) {
        self.errors.push(error);
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ErrorMsg> {
        self.errors.iter()
    }

    pub fn flush(&mut self) {
        self.errors.clear();
    }

    /// Drops the oldest entries beyond `limit`.
    pub fn truncate_front(&mut self, limit: usize) {
        if self.errors.len() > limit {
            let excess = self.errors.len() - limit;
            self.errors.drain(..excess);
        }
    }

    pub fn to_vec(&self) -> Vec<ErrorMsg> {
        self.errors.clone()
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a ErrorMsg;
    type IntoIter = std::slice::Iter<'a, ErrorMsg>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

/// Errors split by visibility: `triggered` ones may be shown to users,
/// `logged` ones only in development mode.
#[derive(Debug, Default, Clone)]
pub struct ErrorLog {
    triggered: ErrorList,
    logged: ErrorList,
}

impl ErrorLog {
    pub fn append(&mut self, error: ErrorMsg) {
        if error.triggered {
            self.triggered.append(error);
        } else {
            self.logged.append(error);
        }
    }

    pub fn len(&self) -> usize {
        self.triggered.len() + self.logged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<ErrorMsg> {
        self.triggered.iter().chain(self.logged.iter()).cloned().collect()
    }

    pub fn triggered(&self) -> &ErrorList {
        &self.triggered
    }

    pub fn logged(&self) -> &ErrorList {
        &self.logged
    }

    pub fn flush(&mut self) {
        self.triggered.flush();
        self.logged.flush();
    }

    /// Keeps at most `limit` entries per list, newest first to survive.
    pub fn truncate_front(&mut self, limit: usize) {
        self.triggered.truncate_front(limit);
        self.logged.truncate_front(limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str, triggered: bool) -> ErrorMsg {
        let mut m = ErrorMsg::new(ErrorLevel::Warning, text);
        m.triggered = triggered;
        m
    }

    #[test]
    fn routes_by_triggered_flag() {
        let mut log = ErrorLog::default();
        log.append(msg("hidden", false));
        log.append(msg("shown", true));
        log.append(msg("shown again", true));

        assert_eq!(log.len(), 3);
        assert_eq!(log.triggered().len(), 2);
        assert_eq!(log.logged().len(), 1);

        let all: Vec<String> = log.all().into_iter().map(|e| e.message).collect();
        assert_eq!(all, vec!["shown", "shown again", "hidden"]);

        log.flush();
        assert!(log.is_empty());
    }

    #[test]
    fn truncation_keeps_newest_entries() {
        let mut log = ErrorLog::default();
        for i in 0..5 {
            log.append(msg(&format!("w{i}"), true));
        }
        log.append(msg("hidden", false));
        log.truncate_front(2);

        let kept: Vec<String> = log.triggered().iter().map(|e| e.message.clone()).collect();
        assert_eq!(kept, vec!["w3", "w4"]);
        assert_eq!(log.logged().len(), 1);
    }

    #[test]
    fn serialises_with_type_key() {
        let v = serde_json::to_value(msg("x", true)).unwrap();
        assert_eq!(v["type"], "Warning");
        assert_eq!(v["triggered"], true);
    }
}
