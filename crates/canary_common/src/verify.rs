//! Credential Verifier
//!
//! Walks every unit's `userkeys` looking for an entry whose `e` equals the
//! expected fingerprint. Units are visited in artifact order and entries in
//! list order; the walk stops at the first match. A shape violation met
//! before a match is an error, never a silent skip.

use crate::error::MalformedStateError;
use crate::literal::{Integer, Literal};
use crate::state::InstallationState;

/// Where the expected credential was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialMatch<'a> {
    pub unit: &'a str,
    pub index: usize,
}

/// True iff some unit carries the expected credential
pub fn check(state: &InstallationState, expected: &Integer) -> Result<bool, MalformedStateError> {
    find_match(state, expected).map(|found| found.is_some())
}

/// Locate the first unit/entry carrying the expected credential
pub fn find_match<'a>(
    state: &'a InstallationState,
    expected: &Integer,
) -> Result<Option<CredentialMatch<'a>>, MalformedStateError> {
    for (unit, record) in state.units() {
        for (index, entry) in userkeys(unit, record)?.iter().enumerate() {
            if exponent(unit, index, entry)? == expected {
                return Ok(Some(CredentialMatch { unit, index }));
            }
        }
    }
    Ok(None)
}

fn userkeys<'a>(unit: &str, record: &'a Literal) -> Result<&'a [Literal], MalformedStateError> {
    if !matches!(record, Literal::Dict(_)) {
        return Err(MalformedStateError::UnitNotMapping {
            unit: unit.to_string(),
            found: record.type_name(),
        });
    }
    match record.get("userkeys") {
        Some(Literal::List(keys)) => Ok(keys),
        Some(other) => Err(MalformedStateError::UserkeysNotList {
            unit: unit.to_string(),
            found: other.type_name(),
        }),
        None => Err(MalformedStateError::MissingUserkeys {
            unit: unit.to_string(),
        }),
    }
}

fn exponent<'a>(unit: &str, index: usize, entry: &'a Literal) -> Result<&'a Integer, MalformedStateError> {
    if !matches!(entry, Literal::Dict(_)) {
        return Err(MalformedStateError::EntryNotMapping {
            unit: unit.to_string(),
            index,
            found: entry.type_name(),
        });
    }
    match entry.get("e") {
        Some(Literal::Int(e)) => Ok(e),
        Some(other) => Err(MalformedStateError::ExponentNotInteger {
            unit: unit.to_string(),
            index,
            found: other.type_name(),
        }),
        None => Err(MalformedStateError::MissingExponent {
            unit: unit.to_string(),
            index,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::decode_state;

    fn expected(value: u64) -> Integer {
        Integer::from(value)
    }

    #[test]
    fn test_match_in_single_unit() {
        let state = decode_state("{'v1': {'userkeys': [{'e': 42}]}}").unwrap();
        assert_eq!(check(&state, &expected(42)), Ok(true));
    }

    #[test]
    fn test_no_match_is_false_not_error() {
        let state = decode_state("{'v1': {'userkeys': [{'e': 7}]}, 'v2': {'userkeys': []}}").unwrap();
        assert_eq!(check(&state, &expected(42)), Ok(false));
    }

    #[test]
    fn test_empty_state_is_not_found() {
        let state = decode_state("{}").unwrap();
        assert_eq!(check(&state, &expected(42)), Ok(false));
    }

    #[test]
    fn test_match_reports_location() {
        let state = decode_state(
            "{'v1': {'userkeys': [{'e': 3L}]}, 'v2': {'userkeys': [{'e': 5L}, {'e': 42L, 'n': 9L}]}}",
        )
        .unwrap();
        let found = find_match(&state, &expected(42)).unwrap().unwrap();
        assert_eq!(found, CredentialMatch { unit: "v2", index: 1 });
    }

    #[test]
    fn test_big_fingerprint_matches_exactly() {
        let e = "11374924881397627694657891503972818975279141290591879258944253588899600389096760006002101031499188547";
        let state = decode_state(&format!("{{'v1': {{'userkeys': [{{'e': {}L}}]}}}}", e)).unwrap();
        assert_eq!(check(&state, &Integer::parse(e).unwrap()), Ok(true));

        let off_by_one = format!("{}8", &e[..e.len() - 1]);
        assert_eq!(check(&state, &Integer::parse(&off_by_one).unwrap()), Ok(false));
    }

    #[test]
    fn test_missing_userkeys_is_malformed() {
        let state = decode_state("{'v1': {'status': 'Fresh'}}").unwrap();
        assert_eq!(
            check(&state, &expected(42)),
            Err(MalformedStateError::MissingUserkeys { unit: "v1".to_string() })
        );
    }

    #[test]
    fn test_entry_without_e_is_malformed() {
        let state = decode_state("{'v1': {'userkeys': [{'n': 42}]}}").unwrap();
        assert_eq!(
            check(&state, &expected(42)),
            Err(MalformedStateError::MissingExponent {
                unit: "v1".to_string(),
                index: 0
            })
        );
    }

    #[test]
    fn test_wrong_types_are_malformed() {
        let cases = [
            ("{'v1': ['userkeys']}", "is of type list"),
            ("{'v1': {'userkeys': {'e': 42}}}", "expected a list"),
            ("{'v1': {'userkeys': [42]}}", "userkeys[0] is of type int"),
            ("{'v1': {'userkeys': [{'e': '42'}]}}", "has 'e' of type str"),
        ];
        for (src, needle) in cases {
            let state = decode_state(src).unwrap();
            let err = check(&state, &expected(42)).unwrap_err();
            assert!(err.to_string().contains(needle), "{}: {}", src, err);
        }
    }

    #[test]
    fn test_short_circuits_before_later_malformed_unit() {
        let state = decode_state("{'v1': {'userkeys': [{'e': 42}]}, 'v2': {}}").unwrap();
        assert_eq!(check(&state, &expected(42)), Ok(true));

        let state = decode_state("{'v2': {}, 'v1': {'userkeys': [{'e': 42}]}}").unwrap();
        assert!(check(&state, &expected(42)).is_err());
    }
}
