//! Helpers for the two identifier schemes used by the upstream service.
//!
//! Identifiers look like `user@server`, optionally with a device suffix
//! (`user:7@server`). Canonical identifiers are phone-number based;
//! alternate ones live on [`ALTERNATE_SERVER`].

use crate::constants::ALTERNATE_SERVER;

/// Strip the device suffix and surrounding whitespace from an identifier.
///
/// Input without an `@` is returned trimmed but otherwise untouched.
pub fn normalize_jid(raw: &str) -> String {
    let raw = raw.trim();
    let Some((user, server)) = raw.split_once('@') else {
        return raw.to_string();
    };
    let user = user.split_once(':').map_or(user, |(u, _device)| u);
    format!("{user}@{server}")
}

/// Whether `jid` uses the alternate identifier scheme.
pub fn is_alternate_jid(jid: &str) -> bool {
    server_of(jid) == Some(ALTERNATE_SERVER)
}

fn server_of(jid: &str) -> Option<&str> {
    jid.rsplit_once('@').map(|(_, server)| server)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_device_suffix() {
        assert_eq!(normalize_jid("5511:12@s.whatsapp.net"), "5511@s.whatsapp.net");
        assert_eq!(normalize_jid(" 5511@s.whatsapp.net "), "5511@s.whatsapp.net");
    }

    #[test]
    fn test_leaves_plain_and_malformed_input() {
        assert_eq!(normalize_jid("123@g.us"), "123@g.us");
        assert_eq!(normalize_jid("not-a-jid"), "not-a-jid");
        assert_eq!(normalize_jid(""), "");
    }

    #[test]
    fn test_detects_alternate_scheme() {
        assert!(is_alternate_jid("998877@lid"));
        assert!(!is_alternate_jid("5511@s.whatsapp.net"));
        assert!(!is_alternate_jid("lid"));
        assert!(!is_alternate_jid("chat@s"));
    }
}
