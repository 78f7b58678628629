use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(&self.0)
            }
        }
    };
}

id_newtype!(UserId);

/// Accepts `null` wherever a list is expected; the server encodes empty lists that way.
pub fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Administrator level. Serialized as the empty string or `"super"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Administrator {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "super")]
    Super,
}

impl Administrator {
    pub fn is_super(self) -> bool {
        self == Administrator::Super
    }

    pub fn toggled(self) -> Self {
        match self {
            Administrator::None => Administrator::Super,
            Administrator::Super => Administrator::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: UserId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub administrator: Administrator,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub roles: Vec<String>,
}

impl User {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Appends `role` unless it is already present. Returns whether the list grew.
    pub fn add_role(&mut self, role: impl Into<String>) -> bool {
        let role = role.into();
        if self.has_role(&role) {
            return false;
        }
        self.roles.push(role);
        true
    }

    /// Removes the first occurrence of `role`. Returns whether anything was removed.
    pub fn remove_role(&mut self, role: &str) -> bool {
        match self.roles.iter().position(|r| r == role) {
            Some(index) => {
                self.roles.remove(index);
                true
            }
            None => false,
        }
    }
}
