use serde::{Deserialize, Serialize};

use crate::model::api::otp::Code;

/// Admin sign-in with email and password.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminLoginRequest {
    pub email: String,
    pub password: String,
}

/// Student sign-in with student ID and password; the first of two factors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentLoginRequest {
    pub student_id: String,
    pub password: String,
}

/// The second factor: the code sent by SMS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentVerifyRequest {
    pub code: Code,
}

/// Sign-in with an ID token already obtained from Google.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleSignInRequest {
    pub id_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}
