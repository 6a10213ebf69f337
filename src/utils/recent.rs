/// Scans at most the last `window` entries of `items`, newest first.
///
/// Entries older than the window are not seen, so a duplicate there is reported as new.
pub fn recently_added<T, F>(items: &[T], window: usize, mut matches: F) -> bool
where
    F: FnMut(&T) -> bool,
{
    items.iter().rev().take(window).any(|item| matches(item))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_entries_inside_window() {
        let items = [1, 2, 3, 4];
        assert!(recently_added(&items, 2, |i| *i == 3));
        assert!(recently_added(&items, 2, |i| *i == 4));
    }

    #[test]
    fn misses_entries_outside_window() {
        let items = [1, 2, 3, 4];
        assert!(!recently_added(&items, 2, |i| *i == 1));
        assert!(!recently_added(&items, 0, |i| *i == 4));
    }
}
