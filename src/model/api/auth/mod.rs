mod google;
mod request;
mod reset;
mod token;
mod user;

pub use google::{email_in_domain, GoogleIdentity};
pub use request::{
    AdminLoginRequest, ForgotPasswordRequest, GoogleSignInRequest, ResetPasswordRequest,
    StudentLoginRequest, StudentVerifyRequest,
};
pub use reset::ResetToken;
pub use token::{AuthToken, AUTH_TOKEN_COOKIE};
pub use user::{Admin, AuthRole, Rights, Student};
