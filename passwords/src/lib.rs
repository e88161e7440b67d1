// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Policy, parameters, and low-level implementation of the password hashes
//! handed to the control plane for the recovery silo user at rack setup

use argon2::password_hash;
use argon2::Argon2;
use argon2::PasswordHasher;
use argon2::PasswordVerifier;
use password_hash::errors::Error as PasswordHashError;
pub use password_hash::PasswordHashString;
use password_hash::SaltString;
use rand::prelude::ThreadRng;
use rand::CryptoRng;
use rand::RngCore;
use schemars::JsonSchema;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_with::SerializeDisplay;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// Parameters for the Argon2 key derivation function (KDF).  These determine
// how much each hash costs in memory, CPU time, and wall time, and they're the
// floor that any operator-supplied hash must meet.  We use the default values
// (provided by the `argon2` crate) for the version, salt length, and output
// length.
const ARGON2_ALGORITHM: argon2::Algorithm = argon2::Algorithm::Argon2id;
pub const ARGON2_COST_M_KIB: u32 = 96 * 1024;
pub const ARGON2_COST_T: u32 = 23;
pub const ARGON2_COST_P: u32 = 1;

// Maximum password length, intended to prevent denial of service attacks.  See
// CVE-2013-1443, CVE-2014-9016, and CVE-2014-9034 for examples.
pub const MAX_PASSWORD_LENGTH: usize = 512;

/// Returns an [`Argon2`] context configured with the minimum parameters we
/// accept for a new password hash
pub fn external_password_argon() -> Argon2<'static> {
    let argon2_params = argon2::Params::new(
        ARGON2_COST_M_KIB,
        ARGON2_COST_T,
        ARGON2_COST_P,
        None,
    )
    .expect("hard-coded argon2 parameters are valid");

    Argon2::new(ARGON2_ALGORITHM, argon2::Version::default(), argon2_params)
}

/// Represents a cleartext password
//
// This type deliberately does not allow someone to get the string back out,
// not even for serde::Serialize or Debug.
#[derive(Clone)]
pub struct Password(secrecy::SecretString);

impl Password {
    pub fn new(password: &str) -> Result<Password, PasswordTooLongError> {
        if password.len() > MAX_PASSWORD_LENGTH {
            Err(PasswordTooLongError)
        } else {
            Ok(Password(secrecy::SecretString::from(password)))
        }
    }
}

#[derive(Error, Debug)]
/// The provided password was too long
#[error("the password provided was too long")]
pub struct PasswordTooLongError;

#[derive(Error, Debug)]
#[error("failed to set password")]
// None of the variants of `argon2::password_hash::errors::Error` should be
// reachable when hashing with fixed parameters, so they all collapse into
// this one type.
pub struct PasswordSetError(#[from] argon2::password_hash::errors::Error);

#[derive(Error, Debug)]
#[error("failed to verify password")]
pub struct PasswordVerifyError(#[from] argon2::password_hash::errors::Error);

/// Reasons an operator-supplied password hash is rejected
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NewPasswordHashError {
    #[error("password hash: {0}")]
    Malformed(String),
    #[error("password hash: algorithm: expected {expected}, found {found}")]
    Algorithm { expected: String, found: String },
    #[error("password hash: expected salt")]
    MissingSalt,
    #[error("password hash: salt: expected at least {minimum} bytes")]
    SaltTooShort { minimum: usize },
    #[error("password hash: expected hash")]
    MissingOutput,
    #[error("password hash: output: expected at least {minimum} bytes")]
    OutputTooShort { minimum: usize },
    #[error("password hash: argon2 parameters: {0}")]
    Parameters(String),
    #[error(
        "password hash: parameter '{name}': expected at least {minimum}, \
         found {found}"
    )]
    WeakParameter { name: char, minimum: u32, found: u32 },
}

/// Password hash string for a _new_ password
///
/// This is a thin wrapper around `PasswordHashString` that only admits hashes
/// meeting our minimum strength requirements.
///
/// We do not use this in the `Hasher` because it's possible that we might want
/// to verify password hashes that we wouldn't allow someone to create anew.
#[derive(Clone, Debug, Deserialize, SerializeDisplay, PartialEq, Eq)]
#[serde(try_from = "String")]
pub struct NewPasswordHash(PasswordHashString);

impl fmt::Display for NewPasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl NewPasswordHash {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NewPasswordHash> for PasswordHashString {
    fn from(value: NewPasswordHash) -> Self {
        value.0
    }
}

impl TryFrom<PasswordHashString> for NewPasswordHash {
    type Error = NewPasswordHashError;

    fn try_from(hash: PasswordHashString) -> Result<Self, Self::Error> {
        verify_strength(&hash)?;
        Ok(NewPasswordHash(hash))
    }
}

impl FromStr for NewPasswordHash {
    type Err = NewPasswordHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(NewPasswordHash(parse_phc_hash(s)?))
    }
}

impl TryFrom<String> for NewPasswordHash {
    type Error = NewPasswordHashError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl JsonSchema for NewPasswordHash {
    fn schema_name() -> String {
        "NewPasswordHash".to_string()
    }

    fn json_schema(
        _: &mut schemars::gen::SchemaGenerator,
    ) -> schemars::schema::Schema {
        schemars::schema::SchemaObject {
            metadata: Some(Box::new(schemars::schema::Metadata {
                title: Some("A password hash in PHC string format".to_string()),
                description: Some(
                    "Password hashes must be in PHC (Password Hashing \
                    Competition) string format.  Passwords must be hashed \
                    with Argon2id.  Password hashes may be rejected if the \
                    parameters appear not to be secure enough."
                        .to_string(),
                ),
                ..Default::default()
            })),
            instance_type: Some(schemars::schema::InstanceType::String.into()),
            ..Default::default()
        }
        .into()
    }
}

/// Create and verify password hashes
// This is a thin wrapper around `argon2`.  It encapsulates the key derivation
// function (KDF) and the random number generator, which helps with testing.
pub struct Hasher<R: CryptoRng + RngCore> {
    argon2: Argon2<'static>,
    rng: R,
}

impl Default for Hasher<ThreadRng> {
    fn default() -> Self {
        Hasher::new(external_password_argon(), rand::thread_rng())
    }
}

impl<R: CryptoRng + RngCore> Hasher<R> {
    pub fn new(argon2: Argon2<'static>, rng: R) -> Self {
        Hasher { argon2, rng }
    }

    pub fn create_password(
        &mut self,
        password: &Password,
    ) -> Result<PasswordHashString, PasswordSetError> {
        let salt = SaltString::generate(&mut self.rng);
        Ok(self
            .argon2
            .hash_password(password.0.expose_secret().as_bytes(), &salt)?
            .serialize())
    }

    pub fn verify_password(
        &self,
        password: &Password,
        hashed: &PasswordHashString,
    ) -> Result<bool, PasswordVerifyError> {
        let parsed = hashed.password_hash();
        match self
            .argon2
            .verify_password(password.0.expose_secret().as_bytes(), &parsed)
        {
            Ok(_) => Ok(true),
            Err(PasswordHashError::Password) => Ok(false),
            Err(error) => Err(PasswordVerifyError(error)),
        }
    }
}

/// Parses the given PHC-format password hash string and returns it only if it
/// meets our minimum strength requirements.
fn parse_phc_hash(s: &str) -> Result<PasswordHashString, NewPasswordHashError> {
    let hash = PasswordHashString::new(s)
        .map_err(|e| NewPasswordHashError::Malformed(e.to_string()))?;
    verify_strength(&hash)?;
    Ok(hash)
}

fn verify_strength(hash: &PasswordHashString) -> Result<(), NewPasswordHashError> {
    if hash.algorithm() != ARGON2_ALGORITHM.ident() {
        return Err(NewPasswordHashError::Algorithm {
            expected: ARGON2_ALGORITHM.to_string(),
            found: hash.algorithm().to_string(),
        });
    }

    match hash.salt() {
        None => return Err(NewPasswordHashError::MissingSalt),
        Some(s) if s.len() < argon2::RECOMMENDED_SALT_LEN => {
            return Err(NewPasswordHashError::SaltTooShort {
                minimum: argon2::RECOMMENDED_SALT_LEN,
            });
        }
        _ => (),
    };

    match hash.hash() {
        None => return Err(NewPasswordHashError::MissingOutput),
        Some(s) if s.len() < argon2::Params::DEFAULT_OUTPUT_LEN => {
            return Err(NewPasswordHashError::OutputTooShort {
                minimum: argon2::Params::DEFAULT_OUTPUT_LEN,
            });
        }
        _ => (),
    };

    let params = argon2::Params::try_from(&hash.password_hash())
        .map_err(|e| NewPasswordHashError::Parameters(e.to_string()))?;
    let checks = [
        ('m', ARGON2_COST_M_KIB, params.m_cost()),
        ('t', ARGON2_COST_T, params.t_cost()),
        ('p', ARGON2_COST_P, params.p_cost()),
    ];
    for (name, minimum, found) in checks {
        if found < minimum {
            return Err(NewPasswordHashError::WeakParameter {
                name,
                minimum,
                found,
            });
        }
    }

    Ok(())
}
