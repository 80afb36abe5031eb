//! Bounding captured command output before it lands in an execution record.
//!
//! Keeps the start and the end of the text, which is where command echo and
//! the final error usually live, and replaces the middle with a marker.

/// Cap `output` at `max_chars` characters, eliding the middle.
///
/// Text within the budget is returned unchanged. Cuts always fall on
/// `char` boundaries.
pub fn truncate_middle(output: &str, max_chars: usize) -> String {
    let total = output.chars().count();
    if total <= max_chars {
        return output.to_owned();
    }

    let keep_head = max_chars / 2;
    let keep_tail = max_chars - keep_head;
    let elided = total - max_chars;

    // Byte offsets of the cut points.
    let head_end = output
        .char_indices()
        .nth(keep_head)
        .map_or(output.len(), |(i, _)| i);
    let tail_start = output
        .char_indices()
        .nth(total - keep_tail)
        .map_or(output.len(), |(i, _)| i);

    format!(
        "{}\n[... {elided} chars elided ...]\n{}",
        &output[..head_end],
        &output[tail_start..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn within_budget_unchanged() {
        assert_eq!(truncate_middle("hello", 5), "hello");
        assert_eq!(truncate_middle("", 10), "");
    }

    #[test]
    fn over_budget_keeps_both_ends() {
        let input = format!("{}{}{}", "A".repeat(50), "B".repeat(100), "C".repeat(50));
        let out = truncate_middle(&input, 100);
        assert!(out.starts_with(&"A".repeat(50)));
        assert!(out.ends_with(&"C".repeat(50)));
        assert!(out.contains("[... 100 chars elided ...]"));
    }

    #[test]
    fn odd_budget_splits_without_losing_a_char() {
        let out = truncate_middle("abcdefghij", 5);
        // 2 from the head, 3 from the tail.
        assert_eq!(out, "ab\n[... 5 chars elided ...]\nhij");
    }

    #[test]
    fn multibyte_text_cut_on_char_boundaries() {
        let input = "é".repeat(1_000);
        let out = truncate_middle(&input, 10);
        assert!(out.starts_with("ééééé\n"));
        assert!(out.ends_with("\nééééé"));
    }

    #[test]
    fn zero_budget_keeps_only_marker() {
        assert_eq!(truncate_middle("abc", 0), "\n[... 3 chars elided ...]\n");
    }
}
