use std::sync::Arc;

use chrono::Utc;
use mongodb::bson::doc;
use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    api::{
        auth::{
            Admin, AdminLoginRequest, AuthToken, ForgotPasswordRequest, GoogleIdentity,
            GoogleSignInRequest, ResetPasswordRequest, ResetToken, Student,
            StudentLoginRequest, AUTH_TOKEN_COOKIE,
        },
        otp::CHALLENGE_COOKIE,
        user::{check_password, UserDescription},
    },
    common::{
        audit::{AuditAction, EntityType},
        user::Role,
    },
    db::{
        audit_log::NewAuditLogEntry,
        user::{hash_password, NewUser, User},
    },
    mongodb::{errors::is_duplicate_key_error, Coll, Id},
};
use crate::notifier::Notifier;
use crate::throttle::RateLimit;

#[cfg(feature = "otp")]
use crate::model::api::{auth::StudentVerifyRequest, otp::Challenge};

pub fn routes() -> Vec<Route> {
    let mut routes = routes![
        admin_login,
        student_login,
        google_sign_in,
        forgot_password,
        reset_password,
        logout,
    ];
    #[cfg(feature = "otp")]
    routes.extend(routes![student_verify]);
    routes
}

#[post("/auth/admin", data = "<credentials>", format = "json")]
pub async fn admin_login(
    _limit: RateLimit,
    cookies: &CookieJar<'_>,
    credentials: Json<AdminLoginRequest>,
    users: Coll<User>,
    config: &State<Config>,
) -> Result<Json<UserDescription>> {
    let with_email = doc! {
        "email": credentials.email.trim().to_lowercase(),
        "role": Role::Admin,
    };

    let admin = users
        .find_one(with_email, None)
        .await?
        .filter(|admin| admin.verify_password(&credentials.password))
        .ok_or_else(|| {
            Error::Status(
                Status::Unauthorized,
                "Invalid email or password".to_string(),
            )
        })?;

    cookies.add(AuthToken::<Admin>::new(&admin).into_cookie(config)?);
    info!("Admin {} signed in", admin.id);

    Ok(Json(admin.into()))
}

/// Check a student's password. With two-factor sign-in enabled this sends a
/// code and sets the challenge cookie; otherwise it signs the student in.
#[post("/auth/student", data = "<credentials>", format = "json")]
pub async fn student_login(
    _limit: RateLimit,
    cookies: &CookieJar<'_>,
    credentials: Json<StudentLoginRequest>,
    users: Coll<User>,
    config: &State<Config>,
    notifier: &State<Arc<dyn Notifier>>,
) -> Result<()> {
    let with_student_id = doc! {
        "student_id": credentials.student_id.trim(),
        "role": Role::Student,
    };

    let student = users
        .find_one(with_student_id, None)
        .await?
        .filter(|student| student.verify_password(&credentials.password))
        .ok_or_else(|| {
            Error::Status(
                Status::Unauthorized,
                "Invalid student ID or password".to_string(),
            )
        })?;

    #[cfg(feature = "otp")]
    {
        let phone = student.phone.as_ref().ok_or_else(|| {
            Error::bad_request("No phone number on file for two-factor sign-in")
        })?;
        let challenge = Challenge::new(student.id);
        notifier.send_code(phone, &challenge.code).await.map_err(|e| {
            warn!("Sign-in code for {} not sent: {e}", student.id);
            Error::Status(
                Status::InternalServerError,
                "Failed to send sign-in code".to_string(),
            )
        })?;
        cookies.add_private(challenge.into_cookie(config)?);
        info!("Sent sign-in code to student {}", student.id);
    }

    #[cfg(not(feature = "otp"))]
    {
        let _ = notifier;
        cookies.add(AuthToken::<Student>::new(&student).into_cookie(config)?);
        info!("Student {} signed in", student.id);
    }

    Ok(())
}

#[cfg(feature = "otp")]
#[post("/auth/student/verify", data = "<request>", format = "json")]
pub async fn student_verify(
    _limit: RateLimit,
    request: Json<StudentVerifyRequest>,
    challenge: Challenge,
    cookies: &CookieJar<'_>,
    users: Coll<User>,
    config: &State<Config>,
) -> Result<Json<UserDescription>> {
    if challenge.code != request.code {
        // One guess per code; the student must request a new one.
        cookies.remove_private(Cookie::named(CHALLENGE_COOKIE));
        return Err(Error::Status(
            Status::Unauthorized,
            "Incorrect sign-in code".to_string(),
        ));
    }

    let filter = doc! { "_id": challenge.user_id, "role": Role::Student };
    let student = users
        .find_one(filter, None)
        .await?
        .ok_or_else(Error::unauthorized)?;

    cookies.add(AuthToken::<Student>::new(&student).into_cookie(config)?);
    // The code is spent.
    cookies.remove_private(Cookie::named(CHALLENGE_COOKIE));
    info!("Student {} signed in", student.id);

    Ok(Json(student.into()))
}

/// Sign in with a Google ID token, creating the student account on first use.
#[post("/auth/google", data = "<request>", format = "json")]
pub async fn google_sign_in(
    _limit: RateLimit,
    request: Json<GoogleSignInRequest>,
    cookies: &CookieJar<'_>,
    users: Coll<User>,
    new_users: Coll<NewUser>,
    config: &State<Config>,
) -> Result<Json<UserDescription>> {
    let identity = GoogleIdentity::fetch(&request.id_token).await?;
    identity.check(config)?;
    let email = identity.email.to_lowercase();

    let student = match users.find_one(doc! { "email": &email }, None).await? {
        Some(user) if user.role == Role::Student => user,
        Some(_) => {
            return Err(Error::Status(
                Status::Unauthorized,
                "Admins must sign in with their password".to_string(),
            ))
        }
        None => {
            let student = account_for(&identity, &email);
            let id: Id = match new_users.insert_one(&student, None).await {
                Ok(result) => result
                    .inserted_id
                    .as_object_id()
                    .ok_or_else(|| {
                        Error::Status(Status::InternalServerError, "Bad inserted ID".to_string())
                    })?
                    .into(),
                Err(e) if is_duplicate_key_error(&e) => {
                    return Err(Error::bad_request(
                        "An account with this student ID already exists",
                    ))
                }
                Err(e) => return Err(e.into()),
            };
            info!("Created student {id} from Google sign-in");
            User { id, user: student }
        }
    };

    cookies.add(AuthToken::<Student>::new(&student).into_cookie(config)?);
    info!("Student {} signed in with Google", student.id);

    Ok(Json(student.into()))
}

/// A new student account from a Google identity. The student ID is the email's local part.
fn account_for(identity: &GoogleIdentity, email: &str) -> NewUser {
    let local_part = email.split('@').next().unwrap_or_default().to_string();
    NewUser {
        email: email.to_string(),
        name: identity
            .name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| local_part.clone()),
        student_id: Some(local_part),
        password_hash: None,
        role: Role::Student,
        department: None,
        gender: None,
        year_of_study: Some(1),
        phone: None,
        email_verified: true,
        created_at: Utc::now(),
    }
}

/// Send a reset token if the account exists. The answer is the same either way.
#[post("/auth/forgot-password", data = "<request>", format = "json")]
pub async fn forgot_password(
    _limit: RateLimit,
    request: Json<ForgotPasswordRequest>,
    users: Coll<User>,
    config: &State<Config>,
    notifier: &State<Arc<dyn Notifier>>,
) -> Result<()> {
    let email = request.email.trim().to_lowercase();
    let Some(user) = users.find_one(doc! { "email": &email }, None).await? else {
        debug!("Password reset requested for unknown email");
        return Ok(());
    };
    let Some(ref phone) = user.phone else {
        warn!("Password reset for user {} has no phone to go to", user.id);
        return Ok(());
    };

    let token = ResetToken::issue(&user, config)?;
    if let Err(e) = notifier.send_password_reset(phone, &token).await {
        warn!("Password reset for user {} not sent: {e}", user.id);
    }
    Ok(())
}

#[post("/auth/reset-password", data = "<request>", format = "json")]
pub async fn reset_password(
    _limit: RateLimit,
    request: Json<ResetPasswordRequest>,
    users: Coll<User>,
    audit_log: Coll<NewAuditLogEntry>,
    config: &State<Config>,
) -> Result<()> {
    let invalid = || Error::bad_request("Invalid or expired reset token");

    let token = ResetToken::decode(&request.token, config).map_err(|_| invalid())?;
    let user = users
        .find_one(token.user_id.as_doc(), None)
        .await?
        .ok_or_else(invalid)?;
    if !token.matches(&user, config) {
        return Err(invalid());
    }
    check_password(&request.new_password)?;

    let update = doc! { "$set": { "password_hash": hash_password(&request.new_password)? } };
    users.update_one(user.id.as_doc(), update, None).await?;

    NewAuditLogEntry::new(
        AuditAction::PasswordReset,
        EntityType::User,
        user.id,
        user.id,
        doc! {},
    )
    .record(&audit_log)
    .await?;
    info!("Password reset for user {}", user.id);

    Ok(())
}

#[delete("/auth")]
pub fn logout(cookies: &CookieJar) -> Status {
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));
    Status::Ok
}

#[cfg(test)]
mod tests {
    use mongodb::Database;
    use rocket::{http::ContentType, local::asynchronous::Client, serde::json::serde_json::json};

    use crate::model::{
        api::otp::{Challenge, Code, CODE_LENGTH},
        db::user::EXAMPLE_PASSWORD,
    };
    use crate::notifier::RecordingNotifier;

    use super::*;

    fn recorded(client: &Client) -> Vec<(String, String)> {
        client
            .rocket()
            .state::<Arc<RecordingNotifier>>()
            .unwrap()
            .sent()
    }

    #[backend_test]
    async fn admin_login_valid(client: Client, users: Coll<NewUser>) {
        users
            .insert_one(NewUser::example_admin(), None)
            .await
            .unwrap();

        let response = client
            .post(uri!(admin_login))
            .header(ContentType::JSON)
            .body(json!(AdminLoginRequest::example()).to_string())
            .dispatch()
            .await;

        assert_eq!(Status::Ok, response.status());
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());
        let admin: UserDescription = response.into_json().await.unwrap();
        assert_eq!(admin.role, Role::Admin);
    }

    #[backend_test]
    async fn admin_login_invalid(client: Client, users: Coll<NewUser>) {
        users
            .insert_one(NewUser::example_admin(), None)
            .await
            .unwrap();
        users
            .insert_one(NewUser::example_student(), None)
            .await
            .unwrap();

        // Wrong password.
        let response = client
            .post(uri!(admin_login))
            .header(ContentType::JSON)
            .body(json!({ "email": "coordinator@rub.edu.bt", "password": "nope" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());

        // Students cannot use the admin login.
        let response = client
            .post(uri!(admin_login))
            .header(ContentType::JSON)
            .body(
                json!({ "email": "02210001.cst@rub.edu.bt", "password": EXAMPLE_PASSWORD })
                    .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));
    }

    #[cfg(feature = "otp")]
    #[backend_test]
    async fn student_two_factor_login(client: Client, users: Coll<NewUser>) {
        users
            .insert_one(NewUser::example_student(), None)
            .await
            .unwrap();

        let response = client
            .post(uri!(student_login))
            .header(ContentType::JSON)
            .body(json!(StudentLoginRequest::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        // Not signed in until the code is verified.
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));

        let cookie = client.cookies().get_private(CHALLENGE_COOKIE).unwrap();
        let config = client.rocket().state::<Config>().unwrap();
        let challenge = Challenge::from_cookie(&cookie, config).unwrap();

        // The code went out by SMS.
        let sent = recorded(&client);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains(&challenge.code.to_string()));

        let response = client
            .post(uri!(student_verify))
            .header(ContentType::JSON)
            .body(json!({ "code": challenge.code }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());
        assert!(client.cookies().get_private(CHALLENGE_COOKIE).is_none());
    }

    #[cfg(feature = "otp")]
    #[backend_test]
    async fn wrong_code_is_rejected(client: Client, users: Coll<NewUser>) {
        users
            .insert_one(NewUser::example_student(), None)
            .await
            .unwrap();
        client
            .post(uri!(student_login))
            .header(ContentType::JSON)
            .body(json!(StudentLoginRequest::example()).to_string())
            .dispatch()
            .await;

        let cookie = client.cookies().get_private(CHALLENGE_COOKIE).unwrap();
        let code = Challenge::from_cookie(&cookie, client.rocket().state().unwrap())
            .unwrap()
            .code;
        let mut digits = [0; CODE_LENGTH];
        digits[0] = if code[0] == 0 { 1 } else { code[0] - 1 };
        let wrong: String = digits
            .into_iter()
            .map(|digit| char::from_digit(digit as u32, 10).unwrap())
            .collect();
        assert!(wrong.parse::<Code>().is_ok());

        let response = client
            .post(uri!(student_verify))
            .header(ContentType::JSON)
            .body(json!({ "code": wrong }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));
        assert!(client.cookies().get_private(CHALLENGE_COOKIE).is_none());

        // The right code no longer works once a guess has been spent.
        let response = client
            .post(uri!(student_verify))
            .header(ContentType::JSON)
            .body(json!({ "code": code.to_string() }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));
    }

    #[cfg(feature = "otp")]
    #[backend_test]
    async fn verify_without_challenge(client: Client) {
        let response = client
            .post(uri!(student_verify))
            .header(ContentType::JSON)
            .body(json!({ "code": "123456" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
    }

    #[backend_test]
    async fn google_sign_in_creates_student(client: Client, users: Coll<User>) {
        let config = client.rocket().state::<Config>().unwrap();
        let identity = GoogleIdentity {
            aud: config.google_client_id().to_string(),
            email: "02230099.cst@rub.edu.bt".to_string(),
            email_verified: true,
            name: Some("Jigme Namgyel".to_string()),
        };
        let request = json!({ "id_token": json!(identity).to_string() });

        let response = client
            .post(uri!(google_sign_in))
            .header(ContentType::JSON)
            .body(request.to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());

        let student = users
            .find_one(doc! { "email": "02230099.cst@rub.edu.bt" }, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(student.student_id.as_deref(), Some("02230099.cst"));
        assert_eq!(student.gender, None);
        assert_eq!(student.department, None);
        assert!(student.password_hash.is_none());

        // Signing in again reuses the account.
        client
            .post(uri!(google_sign_in))
            .header(ContentType::JSON)
            .body(request.to_string())
            .dispatch()
            .await;
        assert_eq!(users.count_documents(None, None).await.unwrap(), 1);
    }

    #[backend_test]
    async fn google_sign_in_outside_domain(client: Client, users: Coll<User>) {
        let config = client.rocket().state::<Config>().unwrap();
        let identity = GoogleIdentity {
            aud: config.google_client_id().to_string(),
            email: "someone@gmail.com".to_string(),
            email_verified: true,
            name: None,
        };

        let response = client
            .post(uri!(google_sign_in))
            .header(ContentType::JSON)
            .body(json!({ "id_token": json!(identity).to_string() }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
        assert_eq!(users.count_documents(None, None).await.unwrap(), 0);
    }

    #[backend_test]
    async fn password_reset_is_single_use(client: Client, db: Database) {
        let users = Coll::<User>::from_db(&db);
        Coll::<NewUser>::from_db(&db)
            .insert_one(NewUser::example_student(), None)
            .await
            .unwrap();

        // Unknown emails look the same as known ones.
        let response = client
            .post(uri!(forgot_password))
            .header(ContentType::JSON)
            .body(json!({ "email": "nobody@rub.edu.bt" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert!(recorded(&client).is_empty());

        let response = client
            .post(uri!(forgot_password))
            .header(ContentType::JSON)
            .body(json!({ "email": "02210001.cst@rub.edu.bt" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let sent = recorded(&client);
        assert_eq!(sent.len(), 1);
        let token = sent[0].1.rsplit(' ').next().unwrap().to_string();

        let reset = json!({ "token": &token, "new_password": "a brand new secret" }).to_string();
        let response = client
            .post(uri!(reset_password))
            .header(ContentType::JSON)
            .body(reset.clone())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let student = users
            .find_one(doc! { "student_id": "02210001" }, None)
            .await
            .unwrap()
            .unwrap();
        assert!(student.verify_password("a brand new secret"));
        assert!(!student.verify_password(EXAMPLE_PASSWORD));

        // The token no longer matches the stored password.
        let response = client
            .post(uri!(reset_password))
            .header(ContentType::JSON)
            .body(reset)
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test(admin)]
    async fn logout_admin(client: Client) {
        let response = client.delete(uri!(logout)).dispatch().await;

        assert_eq!(Status::Ok, response.status());
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));
    }

    #[backend_test(student)]
    async fn logout_student(client: Client) {
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());

        let response = client.delete(uri!(logout)).dispatch().await;

        assert_eq!(Status::Ok, response.status());
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));
    }

    #[backend_test]
    async fn logout_not_logged_in(client: Client) {
        let response = client.delete(uri!(logout)).dispatch().await;

        assert_eq!(Status::Ok, response.status());
    }
}
