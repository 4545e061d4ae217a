//! Codec between user records and the generic document attribute map

use log::error;
use serde_json::Value;

use crate::docstore::AttrMap;
use crate::error::{Error, Result};
use crate::types::{PutUserRequest, User, UserAndPassword};

/// Field names of the persisted user document
pub mod fields {
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
    pub const ROLES: &str = "roles";
    pub const FULL_NAME: &str = "full_name";
    pub const EMAIL: &str = "email";
    pub const METADATA: &str = "metadata";
}

/// Encode a user as a whole-document source map
///
/// Every field is written, including nulls, so that a stored document
/// round-trips. The username goes into the source as well as the document
/// id for more intuitive searchability.
pub fn encode_user(request: &PutUserRequest) -> AttrMap {
    let mut source = AttrMap::new();
    source.insert(
        fields::USERNAME.to_string(),
        Value::String(request.username.clone()),
    );
    source.insert(
        fields::PASSWORD.to_string(),
        Value::String(request.password_hash.clone()),
    );
    source.insert(
        fields::ROLES.to_string(),
        Value::Array(
            request
                .roles
                .iter()
                .map(|role| Value::String(role.clone()))
                .collect(),
        ),
    );
    source.insert(
        fields::FULL_NAME.to_string(),
        request
            .full_name
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    source.insert(
        fields::EMAIL.to_string(),
        request
            .email
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    source.insert(
        fields::METADATA.to_string(),
        Value::Object(request.metadata.clone()),
    );
    source
}

/// Decode a user document, or `None` when the document is malformed
///
/// The username comes from the document id, not the source. A malformed
/// document is logged and skipped; scans continue past it.
pub(crate) fn decode_user(username: &str, source: &AttrMap) -> Option<UserAndPassword> {
    match decode_inner(username, source) {
        Ok(user) => Some(user),
        Err(e) => {
            error!("skipping user document that failed to decode: {}", e);
            None
        }
    }
}

fn decode_inner(username: &str, source: &AttrMap) -> Result<UserAndPassword> {
    let password_hash = match source.get(fields::PASSWORD) {
        Some(Value::String(hash)) => hash.clone(),
        _ => {
            return Err(Error::Decode(format!(
                "[{}] has a missing or non-string password hash",
                username
            )))
        }
    };

    let roles = match source.get(fields::ROLES) {
        Some(Value::Array(values)) => {
            let mut roles = Vec::with_capacity(values.len());
            for value in values {
                match value {
                    Value::String(role) => roles.push(role.clone()),
                    _ => {
                        return Err(Error::Decode(format!(
                            "[{}] has a non-string role entry",
                            username
                        )))
                    }
                }
            }
            roles
        }
        _ => {
            return Err(Error::Decode(format!(
                "[{}] has missing or malformed roles",
                username
            )))
        }
    };

    let full_name = decode_optional_string(username, source, fields::FULL_NAME)?;
    let email = decode_optional_string(username, source, fields::EMAIL)?;

    let metadata = match source.get(fields::METADATA) {
        None | Some(Value::Null) => AttrMap::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return Err(Error::Decode(format!(
                "[{}] has malformed metadata",
                username
            )))
        }
    };

    Ok(UserAndPassword::new(
        User {
            username: username.to_string(),
            roles,
            full_name,
            email,
            metadata,
        },
        password_hash,
    ))
}

fn decode_optional_string(username: &str, source: &AttrMap, field: &str) -> Result<Option<String>> {
    match source.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(Error::Decode(format!(
            "[{}] has a malformed {} field",
            username, field
        ))),
    }
}
