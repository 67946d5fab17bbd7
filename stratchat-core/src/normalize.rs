use unicode_normalization::UnicodeNormalization;

use crate::error::{CoreResult, StratChatError};

fn clean_text(s: &str) -> String {
    // Unicode NFC normalization + BOM strip + CRLF -> LF + trim
    let mut t = s.nfc().collect::<String>();
    if t.starts_with('\u{FEFF}') {
        t.remove(0);
    }
    if t.contains("\r\n") {
        t = t.replace("\r\n", "\n");
    }
    t.trim().to_string()
}

/// Clean an outgoing user message. A message that is empty after trimming is
/// rejected; the widget never submits blank turns.
pub fn normalize_message(raw: &str) -> CoreResult<String> {
    let msg = clean_text(raw);
    if msg.is_empty() {
        return Err(StratChatError::Validation("empty message".into()));
    }
    Ok(msg)
}

/// Clean a requested strategy name. Internal newlines are collapsed away as
/// well; names are single-line identifiers in the saved list.
pub fn normalize_strategy_name(raw: &str) -> CoreResult<String> {
    let name = clean_text(raw).replace('\n', " ");
    if name.is_empty() {
        return Err(StratChatError::Validation("empty strategy name".into()));
    }
    Ok(name)
}
