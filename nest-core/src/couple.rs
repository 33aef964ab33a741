//! The two members of the nest and the documents they share.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::NestError;

/// Domain of the emulated account emails.
pub const EMAIL_DOMAIN: &str = "our-nest.com";

/// One of the two members, identified by their personal code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Member {
    #[serde(rename = "812")]
    Code812,
    #[serde(rename = "917")]
    Code917,
}

impl Member {
    pub const ALL: [Member; 2] = [Member::Code812, Member::Code917];

    pub fn code(self) -> &'static str {
        match self {
            Member::Code812 => "812",
            Member::Code917 => "917",
        }
    }

    pub fn partner(self) -> Member {
        match self {
            Member::Code812 => Member::Code917,
            Member::Code917 => Member::Code812,
        }
    }

    pub fn from_code(code: &str) -> Result<Member, NestError> {
        Member::ALL
            .into_iter()
            .find(|m| m.code() == code)
            .ok_or_else(|| NestError::UnknownUser(code.to_string()))
    }

    /// Account email: `user{code}@our-nest.com`.
    pub fn email(self) -> String {
        email_for_code(self.code())
    }

    /// Recover the member from an account email (`user(\d+)@…`).
    pub fn from_email(email: &str) -> Option<Member> {
        let (local, _) = email.split_once('@')?;
        let digits = local.strip_prefix("user")?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Member::from_code(digits).ok()
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Member {
    type Err = NestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Member::from_code(s)
    }
}

/// Account email for any code.
pub fn email_for_code(code: &str) -> String {
    format!("user{code}@{EMAIL_DOMAIN}")
}

/// Id of the documents both members share: the codes sorted and joined by `_`.
pub fn pair_id() -> String {
    let mut codes: Vec<&str> = Member::ALL.iter().map(|m| m.code()).collect();
    codes.sort_unstable();
    codes.join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partner_is_symmetric() {
        for member in Member::ALL {
            assert_ne!(member, member.partner());
            assert_eq!(member.partner().partner(), member);
        }
    }

    #[test]
    fn test_from_code() {
        assert_eq!(Member::from_code("812").unwrap(), Member::Code812);
        assert_eq!("917".parse::<Member>().unwrap(), Member::Code917);
        assert!(matches!(Member::from_code("123"), Err(NestError::UnknownUser(c)) if c == "123"));
    }

    #[test]
    fn test_email_roundtrip() {
        assert_eq!(Member::Code812.email(), "user812@our-nest.com");
        assert_eq!(Member::from_email("user917@our-nest.com"), Some(Member::Code917));
        assert_eq!(Member::from_email("user123@our-nest.com"), None);
        assert_eq!(Member::from_email("someone@our-nest.com"), None);
        assert_eq!(Member::from_email("user@our-nest.com"), None);
        assert_eq!(Member::from_email("user812"), None);
    }

    #[test]
    fn test_pair_id_sorted() {
        assert_eq!(pair_id(), "812_917");
    }

    #[test]
    fn test_member_serde_uses_code() {
        assert_eq!(serde_json::to_string(&Member::Code812).unwrap(), "\"812\"");
        let m: Member = serde_json::from_str("\"917\"").unwrap();
        assert_eq!(m, Member::Code917);
    }
}
