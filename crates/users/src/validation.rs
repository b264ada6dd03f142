//! Input validation: syntax checks plus advisory availability checks.
//!
//! The availability checks are pre-flight only. Two concurrent registrations
//! can both pass them; storage-level uniqueness constraints catch the loser,
//! and the service maps that late conflict onto the same error kind.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use userhub_core::{DomainError, DomainResult};

use crate::UserPersistence;

/// Minimum username length, in characters.
pub const USERNAME_MIN: usize = 3;
/// Maximum username length, in characters.
pub const USERNAME_MAX: usize = 20;

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
static USERNAME_RE: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL_RE.get_or_init(|| {
        // Local part of dot-separated atoms, then one or more dotted DNS labels.
        let pattern = r"^[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z0-9](?:[a-z0-9-]*[a-z0-9])?$";
        Regex::new(pattern).unwrap_or_else(|error| panic!("email regex failed to compile: {error}"))
    })
}

fn username_regex() -> &'static Regex {
    USERNAME_RE.get_or_init(|| {
        // Length is enforced separately; separators only ever sit between
        // two alphanumeric runs.
        let pattern = r"^[A-Za-z0-9]+(?:[._][A-Za-z0-9]+)*$";
        Regex::new(pattern)
            .unwrap_or_else(|error| panic!("username regex failed to compile: {error}"))
    })
}

/// An email address that passed the syntax check.
///
/// The check runs on the lowercased input; the original spelling is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        if email_regex().is_match(&raw.to_lowercase()) {
            Ok(Self(raw.to_string()))
        } else {
            Err(DomainError::InvalidEmail)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A username that passed the length/character rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Username(String);

impl Username {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let length = raw.chars().count();
        if !(USERNAME_MIN..=USERNAME_MAX).contains(&length) {
            return Err(DomainError::InvalidUsername);
        }
        if !username_regex().is_match(raw) {
            return Err(DomainError::InvalidUsername);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Syntax check, then availability check.
///
/// Syntax failures never reach storage.
pub async fn validate_email<P>(persistence: &P, raw: &str) -> DomainResult<Email>
where
    P: UserPersistence + ?Sized,
{
    let email = Email::parse(raw)?;
    if !persistence.email_available(email.as_str()).await? {
        return Err(DomainError::UnavailableEmail);
    }
    Ok(email)
}

/// Syntax check, then availability check, for an optional username.
///
/// An absent username fails only when `required`; otherwise it passes without
/// touching storage.
pub async fn validate_username<P>(
    persistence: &P,
    raw: Option<&str>,
    required: bool,
) -> DomainResult<Option<Username>>
where
    P: UserPersistence + ?Sized,
{
    let Some(raw) = raw else {
        return if required {
            Err(DomainError::InvalidUsername)
        } else {
            Ok(None)
        };
    };

    let username = Username::parse(raw)?;
    if !persistence.username_available(username.as_str()).await? {
        return Err(DomainError::UnavailableUsername);
    }
    Ok(Some(username))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_common_email_addresses() {
        for ok in [
            "test@test.com",
            "First.Last@Example.org",
            "a+tag@sub.domain.io",
            "x@a-b.c",
        ] {
            assert!(Email::parse(ok).is_ok(), "{ok} should be valid");
        }
    }

    #[test]
    fn rejects_malformed_email_addresses() {
        for bad in [
            "",
            "ab",
            "missing-at.example.com",
            "user@localhost",
            "user@-bad.com",
            "user@bad-.com",
            ".user@example.com",
            "us..er@example.com",
            "user@example.com trailing",
            "two@@example.com",
        ] {
            assert_eq!(Email::parse(bad), Err(DomainError::InvalidEmail), "{bad:?}");
        }
    }

    #[test]
    fn email_keeps_original_spelling() {
        assert_eq!(Email::parse("Ada@Example.COM").unwrap().as_str(), "Ada@Example.COM");
    }

    #[test]
    fn accepts_valid_usernames() {
        for ok in ["abc", "ada.lovelace", "a_b.c", "User123", "abcdefghijklmnopqrst"] {
            assert!(Username::parse(ok).is_ok(), "{ok} should be valid");
        }
    }

    #[test]
    fn rejects_invalid_usernames() {
        for bad in [
            "ab",
            "abcdefghijklmnopqrstu",
            "_abc",
            ".abc",
            "abc_",
            "abc.",
            "ab..c",
            "ab__c",
            "ab._c",
            "ab c",
            "ab-c",
            "",
        ] {
            assert_eq!(Username::parse(bad), Err(DomainError::InvalidUsername), "{bad:?}");
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: anything without an '@' is never a valid email.
        #[test]
        fn email_without_at_is_invalid(raw in "[^@]{0,40}") {
            prop_assert_eq!(Email::parse(&raw), Err(DomainError::InvalidEmail));
        }

        /// Property: usernames outside 3..=20 characters are always rejected.
        #[test]
        fn username_length_bounds(raw in "[a-z0-9]{0,2}|[a-z0-9]{21,40}") {
            prop_assert_eq!(Username::parse(&raw), Err(DomainError::InvalidUsername));
        }

        /// Property: a leading or trailing separator is always rejected.
        #[test]
        fn username_separator_at_edges(core in "[a-z0-9]{3,18}", sep in "[._]", leading in any::<bool>()) {
            let raw = if leading { format!("{sep}{core}") } else { format!("{core}{sep}") };
            prop_assert_eq!(Username::parse(&raw), Err(DomainError::InvalidUsername));
        }

        /// Property: two consecutive separators are always rejected.
        #[test]
        fn username_doubled_separator(left in "[a-z0-9]{1,8}", right in "[a-z0-9]{1,8}", seps in "[._]{2}") {
            let raw = format!("{left}{seps}{right}");
            prop_assert_eq!(Username::parse(&raw), Err(DomainError::InvalidUsername));
        }

        /// Property: alphanumeric runs joined by single separators are accepted.
        #[test]
        fn username_well_formed(parts in prop::collection::vec("[a-zA-Z0-9]{1,4}", 1..4), sep in "[._]") {
            let raw = parts.join(&sep);
            prop_assume!((USERNAME_MIN..=USERNAME_MAX).contains(&raw.chars().count()));
            prop_assert!(Username::parse(&raw).is_ok());
        }
    }
}
