//! Locale names accepted besides `C` and `POSIX`

/// Spellings of the US English UTF-8 locale, compared case-insensitively
const ACCEPTED_UTF8_LOCALES: [&str; 2] = ["en_us.utf8", "en_us.utf-8"];

/// True for the US English UTF-8 locale, in any letter case and with or
/// without the hyphen in `utf-8`
///
/// This is a narrow allow-list, not a general UTF-8 detector: `de_DE.UTF-8`
/// or `C.UTF-8` are rejected. Widen [`ACCEPTED_UTF8_LOCALES`] deliberately,
/// never by pattern matching.
///
/// ```
/// use pgready::is_acceptable_utf8_locale;
///
/// assert!(is_acceptable_utf8_locale("en_US.UTF-8"));
/// assert!(is_acceptable_utf8_locale("en_us.utf8"));
/// assert!(!is_acceptable_utf8_locale("de_DE.utf8"));
/// ```
pub fn is_acceptable_utf8_locale(setting: &str) -> bool {
    ACCEPTED_UTF8_LOCALES
        .iter()
        .any(|accepted| setting.eq_ignore_ascii_case(accepted))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_all_casings() {
        for setting in [
            "en_US.utf8",
            "en_US.utf-8",
            "en_US.UTF8",
            "en_US.UTF-8",
            "EN_us.Utf-8",
        ] {
            assert!(is_acceptable_utf8_locale(setting), "{}", setting);
        }
    }

    #[test]
    fn test_rejects_everything_else() {
        for setting in [
            "",
            "C",
            "POSIX",
            "C.UTF-8",
            "de_DE.utf8",
            "en_GB.UTF-8",
            "en_US",
            "en_US.utf_8",
            " en_US.utf8",
            "en_US.utf8 ",
            "en_US.ISO8859-1",
        ] {
            assert!(!is_acceptable_utf8_locale(setting), "{:?}", setting);
        }
    }
}
