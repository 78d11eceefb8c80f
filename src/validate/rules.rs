//! Which settings are checked and what they must hold

use super::locale::is_acceptable_utf8_locale;
use super::SettingObservation;
use crate::error::Error;

/// The only accepted encoding, matched exactly
pub const REQUIRED_ENCODING: &str = "UTF8";

/// C locale
pub const LOCALE_C: &str = "C";

/// POSIX locale
pub const LOCALE_POSIX: &str = "POSIX";

const OP: &str = "validate";

/// Check applied to one named setting
#[derive(Clone, Copy)]
pub struct SettingRule {
    /// Setting name as reported by `SHOW ALL`
    pub name: &'static str,
    /// True when the value is acceptable
    pub accepts: fn(&str) -> bool,
    /// Error for a rejected value
    pub reject: fn(&SettingObservation) -> Error,
}

impl SettingRule {
    /// Check `observation` against this rule
    pub fn check(&self, observation: &SettingObservation) -> Result<(), Error> {
        if (self.accepts)(&observation.setting) {
            Ok(())
        } else {
            Err((self.reject)(observation))
        }
    }
}

impl std::fmt::Debug for SettingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingRule")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Settings checked at startup; everything else `SHOW ALL` returns is ignored
pub const RULES: &[SettingRule] = &[
    SettingRule {
        name: "server_encoding",
        accepts: is_required_encoding,
        reject: unsupported_encoding,
    },
    SettingRule {
        name: "client_encoding",
        accepts: is_required_encoding,
        reject: unsupported_encoding,
    },
    SettingRule {
        name: "lc_collate",
        accepts: is_supported_locale,
        reject: unsupported_locale,
    },
    SettingRule {
        name: "lc_ctype",
        accepts: is_supported_locale,
        reject: unsupported_locale,
    },
];

/// Rule for a setting name, if it is checked at all
pub fn rule_for(name: &str) -> Option<&'static SettingRule> {
    RULES.iter().find(|rule| rule.name == name)
}

fn is_required_encoding(setting: &str) -> bool {
    setting == REQUIRED_ENCODING
}

fn is_supported_locale(setting: &str) -> bool {
    setting == LOCALE_C || setting == LOCALE_POSIX || is_acceptable_utf8_locale(setting)
}

fn unsupported_encoding(observation: &SettingObservation) -> Error {
    Error::UnsupportedEncoding {
        op: OP,
        name: observation.name.clone(),
        got: observation.setting.clone(),
        want: REQUIRED_ENCODING,
    }
}

fn unsupported_locale(observation: &SettingObservation) -> Error {
    Error::UnsupportedLocale {
        op: OP,
        name: observation.name.clone(),
        got: observation.setting.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observe(name: &str, setting: &str) -> SettingObservation {
        SettingObservation {
            name: name.into(),
            setting: setting.into(),
            description: String::new(),
        }
    }

    fn check(name: &str, setting: &str) -> Option<Result<(), Error>> {
        rule_for(name).map(|rule| rule.check(&observe(name, setting)))
    }

    #[test]
    fn test_encoding_is_exact() {
        assert!(check("server_encoding", "UTF8").unwrap().is_ok());
        assert!(check("client_encoding", "UTF8").unwrap().is_ok());

        for got in ["utf8", "UTF-8", "LATIN1", "SQL_ASCII", ""] {
            match check("client_encoding", got) {
                Some(Err(Error::UnsupportedEncoding { name, got: g, want, .. })) => {
                    assert_eq!(name, "client_encoding");
                    assert_eq!(g, got);
                    assert_eq!(want, "UTF8");
                }
                other => panic!("{:?} accepted: {:?}", got, other),
            }
        }
    }

    #[test]
    fn test_locales() {
        for setting in ["C", "POSIX", "en_US.utf8", "en_US.UTF-8"] {
            assert!(check("lc_collate", setting).unwrap().is_ok(), "{}", setting);
            assert!(check("lc_ctype", setting).unwrap().is_ok(), "{}", setting);
        }

        for setting in ["c", "posix", "de_DE.utf8", "C.UTF-8"] {
            assert!(
                matches!(
                    check("lc_ctype", setting),
                    Some(Err(Error::UnsupportedLocale { .. }))
                ),
                "{}",
                setting
            );
        }
    }

    #[test]
    fn test_unlisted_settings_are_ignored() {
        assert!(rule_for("TimeZone").is_none());
        assert!(rule_for("lc_messages").is_none());
        assert!(rule_for("SERVER_ENCODING").is_none());
    }

    #[test]
    fn test_rule_names_unique() {
        for (i, rule) in RULES.iter().enumerate() {
            assert!(RULES[i + 1..].iter().all(|r| r.name != rule.name));
        }
    }

    #[test]
    fn test_error_messages() {
        let err = check("server_encoding", "LATIN1").unwrap().unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"validate: "server_encoding" is "LATIN1", want "UTF8""#
        );

        let err = check("lc_collate", "de_DE.utf8").unwrap().unwrap_err();
        assert_eq!(err.to_string(), r#"validate: "lc_collate" is "de_DE.utf8""#);
    }
}
