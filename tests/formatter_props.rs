//! Property tests for line rendering.

use netlog::{COLOR_RESET, Severity, render_line, truncate_body};
use proptest::prelude::*;

fn severity() -> impl Strategy<Value = Severity> {
    (0u8..=255).prop_map(Severity::from_code)
}

proptest! {
    #[test]
    fn passthrough_without_metadata(body in ".*") {
        let line = render_line(None, None, &body).expect("render");
        prop_assert_eq!(line.as_str(), body.as_str());
    }

    #[test]
    fn levelled_lines_are_framed(
        body in "[^\n]*",
        severity in severity(),
        timestamp in any::<u64>(),
    ) {
        let line = render_line(Some("00:11:22:33:44:55"), Some((severity, timestamp)), &body)
            .expect("render")
            .into_string();
        let head = format!(
            "00:11:22:33:44:55| {}{} ({timestamp}) ",
            severity.color(),
            severity.letter()
        );
        let tail = format!("{COLOR_RESET}\n");
        prop_assert!(line.starts_with(&head));
        prop_assert!(line.ends_with(&tail));
        prop_assert_eq!(line.len(), head.len() + body.len() + tail.len());
    }

    #[test]
    fn truncation_is_a_prefix(body in ".*", max in 0usize..64) {
        let cut = truncate_body(&body, max);
        prop_assert!(cut.len() <= max);
        prop_assert!(body.starts_with(cut));
    }
}
