use std::fmt::Display;

use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::model::common::user::Role;

/// A kind of signed-in user, with defined rights.
pub trait AuthRole {
    /// The rights carried in this user kind's tokens.
    const RIGHTS: Rights;
    /// The stored role a user must have to hold such a token.
    const ROLE: Role;
}

/// Marker for tokens held by students.
pub enum Student {}

/// Marker for tokens held by administrators.
pub enum Admin {}

impl AuthRole for Student {
    const RIGHTS: Rights = Rights::Student;
    const ROLE: Role = Role::Student;
}

impl AuthRole for Admin {
    const RIGHTS: Rights = Rights::Admin;
    const ROLE: Role = Role::Admin;
}

/// Different privilege levels.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Rights {
    Student = 0,
    Admin = 1,
}

impl From<Role> for Rights {
    fn from(role: Role) -> Self {
        match role {
            Role::Student => Self::Student,
            Role::Admin => Self::Admin,
        }
    }
}

impl Display for Rights {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Student => "student",
                Self::Admin => "admin",
            }
        )
    }
}
