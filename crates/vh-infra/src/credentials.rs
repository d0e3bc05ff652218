use rand::Rng;

/// Root password alphabet. Visually ambiguous glyphs (I, l, O, 0, 1)
/// are excluded.
const CHARSET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789!@#$%^&*";

pub const MIN_PASSWORD_LEN: usize = 16;

/// Generate a random root password of at least [`MIN_PASSWORD_LEN`]
/// characters from [`CHARSET`].
pub fn generate_root_password(len: usize) -> String {
    let len = len.max(MIN_PASSWORD_LEN);
    let mut rng = rand::rng();
    (0..len)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn passwords_are_at_least_minimum_length() {
        assert_eq!(generate_root_password(0).len(), MIN_PASSWORD_LEN);
        assert_eq!(generate_root_password(16).len(), 16);
        assert_eq!(generate_root_password(32).len(), 32);
    }

    #[test]
    fn passwords_only_use_the_charset() {
        let password = generate_root_password(64);
        assert!(password.bytes().all(|b| CHARSET.contains(&b)));
    }

    #[test]
    fn consecutive_passwords_differ() {
        let passwords: HashSet<String> =
            (0..1000).map(|_| generate_root_password(16)).collect();
        assert_eq!(passwords.len(), 1000);
    }
}
