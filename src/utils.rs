pub struct Utils;

impl Utils {
    /// ASCII contents of a fixed-width window up to the first NUL byte, or
    /// the whole window if it never terminates.
    pub fn truncate_to_null(window: &[u8]) -> String {
        let end = window.iter().position(|&b| b == 0).unwrap_or(window.len());
        String::from_utf8_lossy(&window[..end]).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_at_first_null() {
        assert_eq!(Utils::truncate_to_null(b"LSW3_15\0\0\0"), "LSW3_15");
    }

    #[test]
    fn unterminated_window_is_kept_whole() {
        assert_eq!(Utils::truncate_to_null(b"0123456789"), "0123456789");
    }

    #[test]
    fn empty_window() {
        assert_eq!(Utils::truncate_to_null(b""), "");
        assert_eq!(Utils::truncate_to_null(b"\0\0\0"), "");
    }
}
