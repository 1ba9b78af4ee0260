/// Event id allocation and the fixed-width id prefix used on the wire
///
/// Every application-level payload is sent as `<2-digit id><payload>`.
/// Ids start at 10 so the decimal form is always exactly two characters.

/// Smallest event id
pub const EVENT_ID_MIN: u8 = 10;

/// Largest event id
pub const EVENT_ID_MAX: u8 = 99;

/// Number of characters of the id prefix
pub const EVENT_ID_LENGTH: usize = 2;

/// EventIdAllocator - Stateless id assignment over the ids currently in use
pub struct EventIdAllocator;

impl EventIdAllocator {
    /// Return the lowest id in `10..=99` not present in `in_use`
    ///
    /// Returns `None` when the whole range is taken, which a queue capacity
    /// of at most 90 rules out.
    pub fn allocate<I>(in_use: I) -> Option<u8>
    where
        I: IntoIterator<Item = u8>,
    {
        let mut taken = [false; EVENT_ID_MAX as usize + 1];
        let mut empty = true;
        for id in in_use {
            if let Some(slot) = taken.get_mut(id as usize) {
                *slot = true;
            }
            empty = false;
        }
        if empty {
            return Some(EVENT_ID_MIN);
        }

        (EVENT_ID_MIN..=EVENT_ID_MAX).find(|id| !taken[*id as usize])
    }

    /// Prefix `payload` with the zero-padded event id
    pub fn encode_payload(event_id: u8, payload: &str) -> String {
        format!("{:0width$}{}", event_id, payload, width = EVENT_ID_LENGTH)
    }

    /// Split a raw payload into its id prefix and the application payload
    ///
    /// The prefix is the first `EVENT_ID_LENGTH` characters. A raw payload
    /// shorter than that carries no id and no payload. The id is `None` if
    /// the prefix is not all ASCII digits.
    pub fn split_payload(raw: &str) -> (Option<u8>, &str) {
        let split = match raw.char_indices().nth(EVENT_ID_LENGTH) {
            Some((index, _)) => index,
            None if raw.chars().count() == EVENT_ID_LENGTH => raw.len(),
            None => return (None, ""),
        };
        let (prefix, rest) = raw.split_at(split);
        (Self::parse_id(prefix), rest)
    }

    /// Parse a decimal event id made only of ASCII digits
    pub fn parse_id(text: &str) -> Option<u8> {
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        text.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_queue_gets_first_id() {
        assert_eq!(EventIdAllocator::allocate(std::iter::empty()), Some(10));
    }

    #[test]
    fn test_lowest_free_id() {
        assert_eq!(EventIdAllocator::allocate([10, 11, 13]), Some(12));
        assert_eq!(EventIdAllocator::allocate([11, 12]), Some(10));
        assert_eq!(EventIdAllocator::allocate([10, 11, 12]), Some(13));
    }

    #[test]
    fn test_exhausted_range() {
        assert_eq!(EventIdAllocator::allocate(EVENT_ID_MIN..=EVENT_ID_MAX), None);
        assert_eq!(EventIdAllocator::allocate(EVENT_ID_MIN..EVENT_ID_MAX), Some(99));
    }

    #[test]
    fn test_encode_payload() {
        assert_eq!(EventIdAllocator::encode_payload(10, "hello"), "10hello");
        assert_eq!(EventIdAllocator::encode_payload(99, ""), "99");
    }

    #[test]
    fn test_split_payload() {
        assert_eq!(EventIdAllocator::split_payload("42hello"), (Some(42), "hello"));
        assert_eq!(EventIdAllocator::split_payload("42"), (Some(42), ""));
        assert_eq!(EventIdAllocator::split_payload("4"), (None, ""));
        assert_eq!(EventIdAllocator::split_payload("xyrest"), (None, "rest"));
        assert_eq!(EventIdAllocator::split_payload("+5rest"), (None, "rest"));
    }

    #[test]
    fn test_split_payload_multibyte_prefix() {
        assert_eq!(EventIdAllocator::split_payload("1\u{e9}hello"), (None, "hello"));
        assert_eq!(EventIdAllocator::split_payload("\u{e9}\u{e9}"), (None, ""));
        assert_eq!(EventIdAllocator::split_payload("\u{e9}"), (None, ""));
        assert_eq!(EventIdAllocator::split_payload("42\u{e9}t\u{e9}"), (Some(42), "\u{e9}t\u{e9}"));
    }

    #[test]
    fn test_parse_id_digits_only() {
        assert_eq!(EventIdAllocator::parse_id("42"), Some(42));
        assert_eq!(EventIdAllocator::parse_id("+5"), None);
        assert_eq!(EventIdAllocator::parse_id("-1"), None);
        assert_eq!(EventIdAllocator::parse_id(""), None);
        assert_eq!(EventIdAllocator::parse_id("300"), None);
    }
}
