use uuid::Uuid;

/// Appends a fresh time-ordered identifier to `base_text`.
///
/// The result stays readable in the log viewer (`test_receive_log 0192...`)
/// while being unique across calls, which is what lets a test tell its own
/// entry apart from unrelated traffic.
pub fn make_fingerprint(base_text: &str) -> String {
    format!("{base_text} {}", Uuid::now_v7().hyphenated())
}
