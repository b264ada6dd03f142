use serde::{Deserialize, Deserializer, Serialize};

/// Request metadata as attached by the transport layer (`meta$` on the wire).
///
/// This is the minimal shape the service expects once the transport has
/// authenticated the caller. Every field is optional on the wire and
/// malformed values degrade instead of failing the request: a caller id
/// that is not an integer becomes "no caller", a null or non-list `roles`
/// becomes "no roles". The normalisation into a typed identity happens in
/// [`IdentityContext::from`](crate::IdentityContext).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    /// Correlation id of the request (used in logs). Any scalar is accepted.
    #[serde(default, deserialize_with = "lenient::scalar_string")]
    pub id: String,

    #[serde(
        default,
        deserialize_with = "lenient::user",
        skip_serializing_if = "Option::is_none"
    )]
    pub user: Option<RequestUser>,
}

/// Caller section of the request metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestUser {
    /// Integer or numeric string; anything else reads as absent.
    #[serde(
        default,
        deserialize_with = "lenient::integer",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<i64>,

    #[serde(default, deserialize_with = "lenient::strings")]
    pub roles: Vec<String>,

    #[serde(default, deserialize_with = "lenient::strings")]
    pub permissions: Vec<String>,
}

impl RequestMeta {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user: None,
        }
    }

    pub fn with_user(mut self, user_id: i64, roles: &[&str]) -> Self {
        self.user = Some(RequestUser {
            id: Some(user_id),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            permissions: Vec::new(),
        });
        self
    }
}

/// Deserializers that never fail on a well-formed JSON value.
mod lenient {
    use serde::de::IgnoredAny;

    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Int(i64),
        Float(f64),
        Text(String),
        Bool(bool),
        Other(IgnoredAny),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Entry {
        Text(String),
        Other(IgnoredAny),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum List {
        Items(Vec<Entry>),
        Other(IgnoredAny),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MaybeUser {
        User(RequestUser),
        Other(IgnoredAny),
    }

    pub fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(match Scalar::deserialize(deserializer)? {
            Scalar::Int(n) => n.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Text(s) => s,
            Scalar::Bool(b) => b.to_string(),
            Scalar::Other(_) => String::new(),
        })
    }

    pub fn integer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        Ok(match Scalar::deserialize(deserializer)? {
            Scalar::Int(n) => Some(n),
            Scalar::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(f as i64),
            Scalar::Text(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn strings<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        Ok(match List::deserialize(deserializer)? {
            List::Items(items) => items
                .into_iter()
                .filter_map(|entry| match entry {
                    Entry::Text(s) => Some(s),
                    Entry::Other(_) => None,
                })
                .collect(),
            List::Other(_) => Vec::new(),
        })
    }

    pub fn user<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<RequestUser>, D::Error> {
        Ok(match MaybeUser::deserialize(deserializer)? {
            MaybeUser::User(user) => Some(user),
            MaybeUser::Other(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> RequestMeta {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn accepts_sparse_metadata() {
        let meta = parse(r#"{"id":"r-1","user":{}}"#);
        let user = meta.user.unwrap();
        assert_eq!(user.id, None);
        assert!(user.roles.is_empty());

        assert_eq!(parse("{}"), RequestMeta::default());
    }

    #[test]
    fn null_lists_read_as_empty() {
        let user = parse(r#"{"user":{"id":22,"roles":null,"permissions":null}}"#).user.unwrap();
        assert_eq!(user.id, Some(22));
        assert!(user.roles.is_empty());
        assert!(user.permissions.is_empty());
    }

    #[test]
    fn non_string_roles_are_skipped() {
        let user = parse(r#"{"user":{"roles":["USER",7,null,"ADMIN"]}}"#).user.unwrap();
        assert_eq!(user.roles, vec!["USER", "ADMIN"]);

        let user = parse(r#"{"user":{"roles":"USER"}}"#).user.unwrap();
        assert!(user.roles.is_empty());
    }

    #[test]
    fn caller_id_accepts_numbers_and_numeric_strings() {
        let id = |raw: &str| parse(&format!(r#"{{"user":{{"id":{raw}}}}}"#)).user.unwrap().id;

        assert_eq!(id("22"), Some(22));
        assert_eq!(id(r#""22""#), Some(22));
        assert_eq!(id(r#"" 5 ""#), Some(5));
        assert_eq!(id("3.0"), Some(3));
        assert_eq!(id(r#""abc""#), None);
        assert_eq!(id("3.5"), None);
        assert_eq!(id("null"), None);
        assert_eq!(id("true"), None);
        assert_eq!(id("{}"), None);
    }

    #[test]
    fn request_id_accepts_any_scalar() {
        assert_eq!(parse(r#"{"id":7}"#).id, "7");
        assert_eq!(parse(r#"{"id":"r-7"}"#).id, "r-7");
        assert_eq!(parse(r#"{"id":null}"#).id, "");
        assert_eq!(parse(r#"{"id":[1]}"#).id, "");
    }

    #[test]
    fn non_object_user_reads_as_anonymous() {
        assert_eq!(parse(r#"{"user":null}"#).user, None);
        assert_eq!(parse(r#"{"user":"someone"}"#).user, None);
    }
}
