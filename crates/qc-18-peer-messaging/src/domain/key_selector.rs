//! Which private key signs an outgoing envelope.

use serde_json::Value;
use std::fmt;

/// Sentinel `privatekey` value selecting the site's stored key.
pub const STORED_KEY_SENTINEL: &str = "stored";

/// Signing key selection.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum KeySelector {
    /// Explicit hex secret supplied by the caller.
    Explicit(String),
    /// The key stored for the site.
    SiteStored,
    /// The caller's authenticated identity for the site.
    #[default]
    CallerIdentity,
    /// Send unsigned.
    Unsigned,
}

impl KeySelector {
    /// Interpret the client `privatekey` parameter.
    ///
    /// | value              | selector          |
    /// |--------------------|-------------------|
    /// | absent, `null`     | `CallerIdentity`  |
    /// | `"stored"`         | `SiteStored`      |
    /// | `""`, `false`      | `Unsigned`        |
    /// | other string       | `Explicit`        |
    ///
    /// Any other JSON value selects `Unsigned`.
    pub fn from_param(param: Option<&Value>) -> Self {
        match param {
            None | Some(Value::Null) => Self::CallerIdentity,
            Some(Value::String(s)) if s == STORED_KEY_SENTINEL => Self::SiteStored,
            Some(Value::String(s)) if s.is_empty() => Self::Unsigned,
            Some(Value::String(s)) => Self::Explicit(s.clone()),
            Some(_) => Self::Unsigned,
        }
    }

    /// Resolve to a private key. Lookups run only for the selected case.
    pub fn resolve<S, C>(&self, site_key: S, caller_key: C) -> Option<String>
    where
        S: FnOnce() -> Option<String>,
        C: FnOnce() -> Option<String>,
    {
        match self {
            Self::Explicit(key) => Some(key.clone()),
            Self::SiteStored => site_key(),
            Self::CallerIdentity => caller_key(),
            Self::Unsigned => None,
        }
        .filter(|key| !key.is_empty())
    }
}

impl fmt::Debug for KeySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit(_) => f.write_str("Explicit(<redacted>)"),
            Self::SiteStored => f.write_str("SiteStored"),
            Self::CallerIdentity => f.write_str("CallerIdentity"),
            Self::Unsigned => f.write_str("Unsigned"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_param() {
        assert_eq!(KeySelector::from_param(None), KeySelector::CallerIdentity);
        assert_eq!(
            KeySelector::from_param(Some(&Value::Null)),
            KeySelector::CallerIdentity
        );
        assert_eq!(
            KeySelector::from_param(Some(&json!("stored"))),
            KeySelector::SiteStored
        );
        assert_eq!(KeySelector::from_param(Some(&json!(""))), KeySelector::Unsigned);
        assert_eq!(
            KeySelector::from_param(Some(&json!(false))),
            KeySelector::Unsigned
        );
        assert_eq!(
            KeySelector::from_param(Some(&json!("abcd"))),
            KeySelector::Explicit("abcd".into())
        );
    }

    #[test]
    fn test_resolve_only_consults_selected_source() {
        let site = || Some("site-key".to_string());
        let caller = || Some("caller-key".to_string());

        assert_eq!(
            KeySelector::SiteStored.resolve(site, || panic!("caller looked up")),
            Some("site-key".into())
        );
        assert_eq!(
            KeySelector::CallerIdentity.resolve(|| panic!("site looked up"), caller),
            Some("caller-key".into())
        );
        assert_eq!(
            KeySelector::Explicit("k".into()).resolve(site, caller),
            Some("k".into())
        );
        assert_eq!(KeySelector::Unsigned.resolve(site, caller), None);
    }

    #[test]
    fn test_missing_key_resolves_to_none() {
        assert_eq!(KeySelector::SiteStored.resolve(|| None, || None), None);
        assert_eq!(
            KeySelector::CallerIdentity.resolve(|| None, || Some(String::new())),
            None
        );
    }

    #[test]
    fn test_debug_redacts_explicit_key() {
        let selector = KeySelector::Explicit("secret".into());
        assert!(!format!("{selector:?}").contains("secret"));
    }
}
