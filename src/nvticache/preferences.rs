//! Decoding of the NVT preferences.
//! A preference is stored as `name|||type|||default`.

use log::warn;

use crate::errors::CacheError;
use crate::models::{NvtParam, NvtParams};

/// The separator between the parts of a preference.
pub const PREFERENCE_SEPARATOR: &str = "|||";

/// The description given to every preference.
pub const PREFERENCE_DESCRIPTION: &str = "Description";

/// Decodes one preference. The default may be empty, and keeps any
/// separator it contains.
pub fn parse_preference(raw: &str) -> Result<NvtParam, CacheError> {
    let parts: Vec<&str> = raw.splitn(3, PREFERENCE_SEPARATOR).collect();
    match parts.as_slice() {
        [name, param_type, default] => Ok(NvtParam::new(
            param_type,
            default,
            name,
            PREFERENCE_DESCRIPTION,
        )),
        _ => Err(CacheError::MalformedPreference(raw.to_string())),
    }
}

/// Decodes a list of preferences, keyed by name.
/// Malformed entries are logged and skipped, a later entry with the same
/// name replaces an earlier one.
pub fn parse_preferences(oid: &str, raw: &[String]) -> NvtParams {
    let mut params = NvtParams::new();
    for entry in raw {
        match parse_preference(entry) {
            Ok(param) => {
                params.insert(param.name.clone(), param);
            }
            Err(e) => warn!("Skipping a preference of {}: {}", oid, e),
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_default_is_kept() {
        let param = parse_preference("dns-fuzz.timelimit|||entry|||").unwrap();
        assert_eq!(param.param_type, "entry");
        assert_eq!(param.default, "");
        assert_eq!(param.name, "dns-fuzz.timelimit");
        assert_eq!(param.description, "Description");
    }

    #[test]
    fn three_parts_are_positional() {
        let param = parse_preference("Report about:|||radio|||Vulnerable;All").unwrap();
        assert_eq!(param, NvtParam::new("radio", "Vulnerable;All", "Report about:", "Description"));
    }

    #[test]
    fn default_may_hold_the_separator() {
        let param = parse_preference("regex|||entry|||a|||b").unwrap();
        assert_eq!(param.default, "a|||b");
    }

    #[test]
    fn short_entries_are_malformed() {
        assert_eq!(
            parse_preference("name|||entry"),
            Err(CacheError::MalformedPreference("name|||entry".to_string()))
        );
        assert!(parse_preference("").is_err());
    }

    #[test]
    fn malformed_entries_do_not_stop_decoding() {
        let raw = vec![
            "a|||checkbox|||no".to_string(),
            "broken".to_string(),
            "b|||password|||".to_string(),
            "a|||checkbox|||yes".to_string(),
        ];
        let params = parse_preferences("1.2.3", &raw);
        assert_eq!(params.len(), 2);
        assert_eq!(params["a"].default, "yes");
        assert_eq!(params["b"].param_type, "password");
    }
}
