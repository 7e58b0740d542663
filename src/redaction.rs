use once_cell::sync::Lazy;
use regex::Regex;

static SECRET_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r#"(?i)"((?:new|confirm)?_?password(?:_?hash)?|secret_?key|access_?key)"\s*:\s*"[^"]*""#)
            .expect("valid regex"),
        Regex::new(r#"(?i)\b((?:new|confirm)?_?password(?:_?hash)?|secret_?key|access_?key)\s*[:=]\s*[^\s&,\["][^\s&,]*"#)
            .expect("valid regex"),
        Regex::new(r"\b([a-f0-9]{64})\b").expect("valid regex"),
    ]
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionResult {
    pub content: String,
    pub redaction_count: usize,
}

/// Masks credentials in text bound for the log.
#[derive(Debug, Default, Clone)]
pub struct Redactor;

impl Redactor {
    pub fn new() -> Self {
        Self
    }

    pub fn redact(&self, input: &str) -> RedactionResult {
        let mut result = input.to_string();
        let mut redaction_count = 0usize;

        for pattern in SECRET_PATTERNS.iter() {
            let matches = pattern.find_iter(&result).count();
            if matches == 0 {
                continue;
            }

            redaction_count += matches;
            result = pattern
                .replace_all(&result, |caps: &regex::Captures<'_>| {
                    let key = caps.get(1).map(|m| m.as_str()).unwrap_or("secret");
                    if key.len() == 64 && key.chars().all(|c| c.is_ascii_hexdigit()) {
                        "[REDACTED_HASH]".to_string()
                    } else {
                        format!("{}=[REDACTED]", key.to_ascii_lowercase())
                    }
                })
                .to_string();
        }

        RedactionResult {
            content: result,
            redaction_count,
        }
    }

    /// Serializes a request argument and redacts it for a log field.
    pub fn redact_args<T: serde::Serialize>(&self, args: &T) -> String {
        match serde_json::to_string(args) {
            Ok(raw) => self.redact(&raw).content,
            Err(err) => format!("<unserializable: {}>", err),
        }
    }
}
