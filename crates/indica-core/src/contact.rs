// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Phone number normalization.
//!
//! Free-form contact strings are reduced to a canonical `+<digits>` address.
//! Local numbers whose length and area code match a known country are
//! prefixed with that country's calling code.

use crate::error::IndicaError;

/// Shortest canonical address accepted by the provider, including the `+`.
pub const MIN_CANONICAL_LEN: usize = 12;

struct CountryRule {
    calling_code: &'static str,
    local_lengths: &'static [usize],
    area_codes: &'static [&'static str],
}

const BRAZIL: CountryRule = CountryRule {
    calling_code: "55",
    local_lengths: &[11],
    area_codes: &[
        "11", "12", "13", "14", "15", "16", "17", "18", "19", "21", "22", "24", "27", "28",
        "31", "32", "33", "34", "35", "37", "38", "41", "42", "43", "44", "45", "46", "47",
        "48", "49", "51", "53", "54", "55", "61", "62", "63", "64", "65", "66", "67", "68",
        "69", "71", "73", "74", "75", "77", "79", "81", "82", "83", "84", "85", "86", "87",
        "88", "89", "91", "92", "93", "94", "95", "96", "97", "98", "99",
    ],
};

const KNOWN_COUNTRIES: &[CountryRule] = &[BRAZIL];

impl CountryRule {
    fn matches_local(&self, digits: &str) -> bool {
        self.local_lengths.contains(&digits.len())
            && digits
                .get(..2)
                .is_some_and(|area| self.area_codes.contains(&area))
    }
}

/// Normalizes a contact string into `+<digits>` form.
///
/// The result is not guaranteed to be valid; see [`is_valid`].
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim_start();
    let explicit_plus = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();

    if explicit_plus {
        return format!("+{digits}");
    }
    if let Some(international) = digits.strip_prefix("00").filter(|d| !d.is_empty()) {
        return format!("+{international}");
    }
    if let Some(rule) = KNOWN_COUNTRIES.iter().find(|r| r.matches_local(&digits)) {
        return format!("+{}{digits}", rule.calling_code);
    }
    format!("+{digits}")
}

/// Provider-format rule for canonical addresses.
pub fn is_valid(canonical: &str) -> bool {
    canonical.len() >= MIN_CANONICAL_LEN
        && canonical
            .strip_prefix('+')
            .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit()))
}

/// Normalizes and validates in one step.
pub fn canonicalize(raw: &str) -> Result<String, IndicaError> {
    let canonical = normalize(raw);
    if is_valid(&canonical) {
        Ok(canonical)
    } else {
        Err(IndicaError::Validation(format!(
            "invalid contact address: {raw:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn local_brazilian_mobile_gets_country_code() {
        assert_eq!(normalize("(11) 99999-0000"), "+5511999990000");
        assert_eq!(normalize("11999990000"), "+5511999990000");
    }

    #[test]
    fn ten_digit_input_is_not_treated_as_local() {
        assert_eq!(normalize("(21) 3333-4444"), "+2133334444");
        assert_eq!(normalize("415 555 0000"), "+4155550000");
        assert!(canonicalize("415 555 0000").is_err());
    }

    #[test]
    fn explicit_international_is_kept() {
        assert_eq!(normalize("+1 415 555 0000"), "+14155550000");
        assert_eq!(normalize("+55 (11) 99999-0000"), "+5511999990000");
    }

    #[test]
    fn double_zero_prefix_is_international() {
        assert_eq!(normalize("00 44 20 7946 0000"), "+442079460000");
    }

    #[test]
    fn unknown_area_code_is_not_prefixed() {
        // 20 is not a Brazilian area code.
        assert_eq!(normalize("20999990000"), "+20999990000");
    }

    #[test]
    fn validation_rules() {
        assert!(is_valid("+5511999990000"));
        assert!(is_valid("+14155550000"));
        assert!(!is_valid("+1415555"));
        assert!(!is_valid("5511999990000"));
        assert!(!is_valid("+"));
        assert!(canonicalize("not a phone").is_err());
        assert_eq!(canonicalize("11 99999 0000").unwrap(), "+5511999990000");
    }

    proptest! {
        #[test]
        fn canonical_input_is_unchanged(digits in "[1-9][0-9]{10,13}") {
            let canonical = format!("+{digits}");
            prop_assert_eq!(normalize(&canonical), canonical);
        }

        #[test]
        fn normalize_is_idempotent(raw in "[+]?[0-9 ()-]{0,20}") {
            let once = normalize(&raw);
            prop_assert_eq!(normalize(&once), once.clone());
            prop_assert!(once.starts_with('+'));
        }
    }
}
