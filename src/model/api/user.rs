use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::user::{Gender, Role},
    db::user::{hash_password, NewUser, User, MIN_PASSWORD_LENGTH},
};

use super::{id::ApiId, sms::Sms};

/// A user as shown through the API. Never includes the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDescription {
    pub id: ApiId,
    pub email: String,
    pub student_id: Option<String>,
    pub name: String,
    pub role: Role,
    pub department: Option<String>,
    pub gender: Option<Gender>,
    pub year_of_study: Option<u8>,
    pub phone: Option<Sms>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserDescription {
    fn from(user: User) -> Self {
        Self {
            id: user.id.into(),
            email: user.user.email,
            student_id: user.user.student_id,
            name: user.user.name,
            role: user.user.role,
            department: user.user.department,
            gender: user.user.gender,
            year_of_study: user.user.year_of_study,
            phone: user.user.phone,
            created_at: user.user.created_at,
        }
    }
}

/// An account created by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub year_of_study: Option<u8>,
    #[serde(default)]
    pub phone: Option<Sms>,
}

impl CreateUserRequest {
    /// Validate the request and hash its password.
    pub fn into_user(self) -> Result<NewUser> {
        let email = self.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(Error::bad_request("A valid email is required"));
        }
        if self.name.trim().is_empty() {
            return Err(Error::bad_request("Name is required"));
        }
        check_password(&self.password)?;
        let student_id = self
            .student_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        if self.role == Role::Student && student_id.is_none() {
            return Err(Error::bad_request("Students need a student ID"));
        }
        if let Some(year) = self.year_of_study {
            check_year(year)?;
        }

        Ok(NewUser {
            email,
            student_id,
            name: self.name.trim().to_string(),
            password_hash: Some(hash_password(&self.password)?),
            role: self.role,
            department: self.department.filter(|d| !d.trim().is_empty()),
            gender: self.gender,
            year_of_study: self.year_of_study,
            phone: self.phone,
            email_verified: false,
            created_at: Utc::now(),
        })
    }
}

/// Details a student may fill in or correct themselves.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub year_of_study: Option<u8>,
    #[serde(default)]
    pub phone: Option<Sms>,
}

impl ProfileUpdate {
    /// Apply the changes. Absent fields are left alone.
    pub fn apply_to(self, user: &mut NewUser) -> Result<()> {
        if let Some(year) = self.year_of_study {
            check_year(year)?;
            user.year_of_study = Some(year);
        }
        if let Some(department) = self.department {
            if department.trim().is_empty() {
                return Err(Error::bad_request("Department cannot be empty"));
            }
            user.department = Some(department.trim().to_string());
        }
        if let Some(gender) = self.gender {
            user.gender = Some(gender);
        }
        if let Some(phone) = self.phone {
            user.phone = Some(phone);
        }
        Ok(())
    }
}

/// Reject passwords that are too short.
pub fn check_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(Error::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

fn check_year(year: u8) -> Result<()> {
    if !(1..=6).contains(&year) {
        return Err(Error::bad_request("Year of study must be between 1 and 6"));
    }
    Ok(())
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;
    use crate::model::db::user::EXAMPLE_PASSWORD;

    impl CreateUserRequest {
        pub fn example() -> Self {
            Self {
                email: "02210003.cst@rub.edu.bt".to_string(),
                name: "Dechen Wangmo".to_string(),
                password: EXAMPLE_PASSWORD.to_string(),
                role: Role::Student,
                student_id: Some("02210003".to_string()),
                department: Some("Information Technology".to_string()),
                gender: Some(Gender::Female),
                year_of_study: Some(1),
                phone: None,
            }
        }
    }

    #[test]
    fn create_requires_student_id_for_students() {
        let request = CreateUserRequest {
            student_id: None,
            ..CreateUserRequest::example()
        };
        assert!(request.into_user().is_err());

        let admin = CreateUserRequest {
            student_id: None,
            role: Role::Admin,
            ..CreateUserRequest::example()
        };
        let user = admin.into_user().unwrap();
        assert!(user.is_admin());
        assert!(user.verify_password(EXAMPLE_PASSWORD));
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(check_password("short").is_err());
        assert!(check_password(EXAMPLE_PASSWORD).is_ok());
    }

    #[test]
    fn profile_update_fills_missing_details() {
        let mut user = NewUser {
            gender: None,
            department: None,
            ..NewUser::example_student()
        };
        let update = ProfileUpdate {
            gender: Some(Gender::Female),
            department: Some("Architecture".to_string()),
            ..ProfileUpdate::default()
        };
        update.apply_to(&mut user).unwrap();
        assert_eq!(user.gender, Some(Gender::Female));
        assert_eq!(user.department.as_deref(), Some("Architecture"));
        assert_eq!(user.year_of_study, Some(2));

        let bad_year = ProfileUpdate {
            year_of_study: Some(9),
            ..ProfileUpdate::default()
        };
        assert!(bad_year.apply_to(&mut user).is_err());
    }
}
