// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

const NAME_PATTERN: &str = r"^(?![0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$)^[a-z]([a-zA-Z0-9-]*[a-zA-Z0-9]+)?$";

/// Maximum length of a [`Name`], in bytes.
pub const NAME_MAX_LEN: usize = 63;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("name cannot be a valid UUID to avoid conflicts")]
    UuidConflict(String),
    #[error("name may contain at most 63 characters")]
    TooLong(String),
    #[error("name requires at least one character")]
    Empty,
    #[error("name must begin with an ASCII lowercase character")]
    InvalidFirstCharacter(String, char),
    #[error(
        "name contains invalid character: \"{1}\" (allowed characters are \
         ASCII letters, digits, and \"-\")"
    )]
    InvalidCharacter(String, char),
    #[error("name cannot end with \"{1}\"")]
    InvalidLastCharacter(String, char),
}

/// A name used in rack configuration
///
/// Names are user-provided identifiers, unique within their parent
/// collection.  A `Name` can only be constructed with a string that's valid as
/// a name.
#[derive(
    Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(try_from = "String")]
pub struct Name(String);

/// `Name::try_from(String)` is the primary method for constructing a Name
/// from an input string.  This validates the string according to our
/// requirements for a name.
impl TryFrom<String> for Name {
    type Error = NameError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.len() > NAME_MAX_LEN {
            return Err(NameError::TooLong(value));
        }

        let mut iter = value.chars();

        let first = iter.next().ok_or(NameError::Empty)?;
        if !first.is_ascii_lowercase() {
            return Err(NameError::InvalidFirstCharacter(value, first));
        }

        let mut last = first;
        for c in iter {
            last = c;

            if !c.is_ascii_alphanumeric() && c != '-' {
                return Err(NameError::InvalidCharacter(value, c));
            }
        }

        if last == '-' {
            return Err(NameError::InvalidLastCharacter(value, last));
        }

        // Only a 36-character string can be a canonical UUID; `Uuid` itself
        // also accepts the simple and braced forms, which are not a concern.
        if value.len() == 36 && Uuid::parse_str(&value).is_ok() {
            return Err(NameError::UuidConflict(value));
        }

        Ok(Name(value))
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Name::try_from(String::from(value))
    }
}

impl<'a> From<&'a Name> for &'a str {
    fn from(n: &'a Name) -> Self {
        n.as_str()
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        name.0
    }
}

/// `Name` instances are comparable like Strings, primarily so that they can
/// be used as keys in trees.
impl<S> PartialEq<S> for Name
where
    S: AsRef<str>,
{
    fn eq(&self, other: &S) -> bool {
        self.0 == other.as_ref()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Custom JsonSchema implementation to encode the constraints on Name
impl JsonSchema for Name {
    fn schema_name() -> String {
        "Name".to_string()
    }
    fn json_schema(
        _: &mut schemars::gen::SchemaGenerator,
    ) -> schemars::schema::Schema {
        schemars::schema::SchemaObject {
            metadata: Some(Box::new(schemars::schema::Metadata {
                title: Some("A name unique within the parent collection".to_string()),
                description: Some(
                    "Names must begin with a lower case ASCII letter, be \
                     composed exclusively of lowercase ASCII, uppercase \
                     ASCII, numbers, and '-', and may not end with a '-'. \
                     Names cannot be a UUID, but they may contain a UUID. \
                     They can be at most 63 characters long."
                        .to_string(),
                ),
                ..Default::default()
            })),
            instance_type: Some(schemars::schema::InstanceType::String.into()),
            string: Some(Box::new(schemars::schema::StringValidation {
                max_length: Some(NAME_MAX_LEN as u32),
                min_length: Some(1),
                pattern: Some(NAME_PATTERN.to_string()),
            })),
            ..Default::default()
        }
        .into()
    }
}

impl Name {
    /// Return the `&str` representing the actual name.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

#[cfg(test)]
mod test {
    use super::Name;
    use super::NameError;
    use proptest::prelude::*;

    #[test]
    fn test_name_parse() {
        let long_name =
            "a234567890123456789012345678901234567890123456789012345678901234";
        assert_eq!(long_name.len(), 64);
        let error_cases: Vec<(&str, &str)> = vec![
            ("", "name requires at least one character"),
            (long_name, "name may contain at most 63 characters"),
            ("123", "name must begin with an ASCII lowercase character"),
            ("-abc", "name must begin with an ASCII lowercase character"),
            ("Abc", "name must begin with an ASCII lowercase character"),
            ("abc-", "name cannot end with \"-\""),
            (
                "a_c",
                "name contains invalid character: \"_\" (allowed characters \
                 are ASCII letters, digits, and \"-\")",
            ),
            (
                "a\u{00e9}cc",
                "name contains invalid character: \"\u{00e9}\" (allowed \
                 characters are ASCII letters, digits, and \"-\")",
            ),
            (
                "abcd1234-abcd-4bcd-8bcd-abcdef012345",
                "name cannot be a valid UUID to avoid conflicts",
            ),
        ];

        for (input, expected_message) in error_cases {
            eprintln!("check name \"{}\" (expecting error)", input);
            assert_eq!(
                input.parse::<Name>().unwrap_err().to_string(),
                expected_message
            );
        }

        let valid_names: Vec<&str> = vec![
            "a",
            "abc",
            "abc-123",
            "a123",
            "aBc",
            "a-b-c",
            "abcd1234-abcd-4bcd-8bcd-abcdef012345x",
            &long_name[0..63],
        ];

        for name in valid_names {
            eprintln!("check name \"{}\" (should be valid)", name);
            assert_eq!(name, name.parse::<Name>().unwrap().as_str());
        }
    }

    #[test]
    fn test_name_serde() {
        let name: Name = serde_json::from_str(r#""recovery""#).unwrap();
        assert_eq!(name, "recovery");
        assert_eq!(serde_json::to_string(&name).unwrap(), r#""recovery""#);

        let err = serde_json::from_str::<Name>(r#""recovery-""#).unwrap_err();
        assert!(err.to_string().contains("cannot end with"), "{err}");
    }

    #[test]
    fn test_name_rejects_uppercase_uuid() {
        assert!(matches!(
            "aBCD1234-abcd-4bcd-8bcd-abcdef012345".parse::<Name>(),
            Err(NameError::UuidConflict(_))
        ));
    }

    fn is_canonical_uuid(s: &str) -> bool {
        s.len() == 36 && uuid::Uuid::parse_str(s).is_ok()
    }

    proptest! {
        #[test]
        fn accepted_names_satisfy_invariants(s in "[a-zA-Z0-9_-]{0,70}") {
            if let Ok(name) = s.parse::<Name>() {
                let name = name.as_str();
                prop_assert!(!name.is_empty() && name.len() <= 63);
                prop_assert!(name.starts_with(|c: char| c.is_ascii_lowercase()));
                prop_assert!(!name.ends_with('-'));
                prop_assert!(name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-'));
                prop_assert!(!is_canonical_uuid(name));
            }
        }

        #[test]
        fn well_formed_names_are_accepted(
            s in "[a-z][a-zA-Z0-9-]{0,61}[a-zA-Z0-9]"
        ) {
            prop_assume!(!is_canonical_uuid(&s));
            prop_assert_eq!(s.parse::<Name>().map(String::from), Ok(s.clone()));
        }
    }
}
