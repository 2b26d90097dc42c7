use uuid::Uuid;

const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 9;

/// Snippet id: the creation time in base36 followed by nine random base36
/// characters, so ids minted in the same millisecond still differ.
pub fn generate_id(now_ms: i64) -> String {
    let mut id = to_base36(u64::try_from(now_ms).unwrap_or(0));
    let random = Uuid::new_v4();
    id.extend(
        random
            .as_bytes()
            .iter()
            .take(SUFFIX_LEN)
            .map(|b| ALPHABET[(*b % 36) as usize] as char),
    );
    id
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while value > 0 {
        digits.push(ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_700_000_000_000), "loyw3v28");
    }

    #[test]
    fn test_ids_in_same_millisecond_differ() {
        let ids: HashSet<_> = (0..1_000).map(|_| generate_id(1_700_000_000_000)).collect();
        assert_eq!(ids.len(), 1_000);

        for id in &ids {
            assert!(id.starts_with("loyw3v28"));
            assert_eq!(id.len(), 8 + SUFFIX_LEN);
            assert!(id.bytes().all(|b| ALPHABET.contains(&b)));
        }
    }
}
