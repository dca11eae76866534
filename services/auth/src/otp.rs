//! One-time password lifecycle
//!
//! Codes are six decimal digits drawn from 100000..=999999, so they never
//! start with zero. A code is attached to the user record together with its
//! expiry, mailed to the user, and accepted at most once before it expires.
//! Issuing a new code overwrites the previous one.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common::{
    error::{DatabaseError, MailError},
    mail::{MailMessage, Mailer},
};
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    models::{NewUser, OtpChallenge, User},
    repositories::UserStore,
    validation::is_otp_shaped,
};

/// Default lifetime of an issued code.
pub const OTP_TTL_MINUTES: i64 = 10;

#[derive(Error, Debug)]
pub enum OtpError {
    /// Wrong code, expired code, or no outstanding code
    #[error("invalid or expired code")]
    InvalidOrExpired,

    #[error("user not found")]
    UserNotFound,

    #[error("user already verified")]
    AlreadyVerified,

    #[error("email already registered")]
    EmailTaken,

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Mail(#[from] MailError),
}

/// Generate a uniformly random code in `100000..=999999`.
pub fn generate() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OtpMail {
    Verification,
    Resend,
}

/// Human wording for a code lifetime, e.g. `10 minutes` or `30 seconds`.
fn lifetime(ttl: Duration) -> String {
    let (amount, unit) = if ttl < Duration::minutes(1) {
        (ttl.num_seconds(), "second")
    } else {
        (ttl.num_minutes(), "minute")
    };
    let plural = if amount == 1 { "" } else { "s" };
    format!("{amount} {unit}{plural}")
}

fn render(kind: OtpMail, to: &str, code: &str, ttl: Duration) -> MailMessage {
    let lifetime = lifetime(ttl);
    let (subject, intro) = match kind {
        OtpMail::Verification => (
            "Your Verification Code",
            "<p>Enter this code to verify your account:</p>",
        ),
        OtpMail::Resend => ("Your New Verification Code", ""),
    };

    MailMessage {
        to: to.to_string(),
        subject: subject.to_string(),
        html: format!(
            "<h2>{subject}</h2>{intro}\
             <h1 style=\"font-size: 32px; letter-spacing: 4px;\">{code}</h1>\
             <p>This code will expire in {lifetime}.</p>"
        ),
        text: format!(
            "{subject}\n\nYour code: {code}\n\nThis code will expire in {lifetime}.\n"
        ),
    }
}

/// Issues, checks and reissues verification codes.
#[derive(Clone)]
pub struct OtpService {
    store: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    ttl: Duration,
}

impl OtpService {
    pub fn new(store: Arc<dyn UserStore>, mailer: Arc<dyn Mailer>, ttl: Duration) -> Self {
        Self { store, mailer, ttl }
    }

    fn challenge(&self, code: String, now: DateTime<Utc>) -> OtpChallenge {
        OtpChallenge {
            code,
            expires_at: now + self.ttl,
        }
    }

    async fn deliver(&self, kind: OtpMail, to: &str, code: &str) -> Result<(), OtpError> {
        let message = render(kind, to, code, self.ttl);
        self.mailer.send(message).await?;
        debug!(to = %to, kind = ?kind, "verification code mailed");
        Ok(())
    }

    /// Create an unverified user carrying a fresh code and mail the code.
    pub async fn register(
        &self,
        name: String,
        email: String,
        password_hash: String,
    ) -> Result<User, OtpError> {
        let otp = self.challenge(generate(), Utc::now());
        let new_user = NewUser {
            name,
            email,
            password_hash,
            otp,
        };

        let user = self.store.create(&new_user).await.map_err(|e| match e {
            DatabaseError::UniqueViolation(_) => OtpError::EmailTaken,
            other => OtpError::Database(other),
        })?;

        self.deliver(OtpMail::Verification, &user.email, &new_user.otp.code)
            .await?;
        info!(user_id = %user.id, "user registered with pending verification");
        Ok(user)
    }

    /// Replace the outstanding code of a pending user with a fresh one and mail it.
    pub async fn reissue(&self, user: &User) -> Result<OtpChallenge, OtpError> {
        let otp = self.challenge(generate(), Utc::now());
        if !self.store.set_otp(&user.email, &otp).await? {
            // Verified (or gone) since it was read.
            return Err(OtpError::AlreadyVerified);
        }

        self.deliver(OtpMail::Resend, &user.email, &otp.code).await?;
        info!(user_id = %user.id, "verification code reissued");
        Ok(otp)
    }

    /// Accept `code` for `email` if it is the outstanding, unexpired code.
    pub async fn validate(&self, email: &str, code: &str) -> Result<User, OtpError> {
        self.validate_at(email, code, Utc::now()).await
    }

    pub async fn validate_at(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<User, OtpError> {
        if !is_otp_shaped(code) {
            return Err(OtpError::InvalidOrExpired);
        }

        let user = self
            .store
            .consume_otp(email, code, now)
            .await?
            .ok_or(OtpError::InvalidOrExpired)?;

        info!(user_id = %user.id, "email verified");
        Ok(user)
    }

    /// Look up a user that is still waiting for verification.
    pub async fn pending_user(&self, email: &str) -> Result<User, OtpError> {
        let user = self
            .store
            .find_by_email(email)
            .await?
            .ok_or(OtpError::UserNotFound)?;

        if user.is_verified {
            return Err(OtpError::AlreadyVerified);
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MemoryUserStore;
    use crate::test_support::{FailingMailer, RecordingMailer};
    use regex::Regex;

    fn service() -> (OtpService, MemoryUserStore, RecordingMailer) {
        let store = MemoryUserStore::new();
        let mailer = RecordingMailer::default();
        let service = OtpService::new(
            Arc::new(store.clone()),
            Arc::new(mailer.clone()),
            Duration::minutes(OTP_TTL_MINUTES),
        );
        (service, store, mailer)
    }

    async fn reissue(service: &OtpService, email: &str) -> Result<OtpChallenge, OtpError> {
        let user = service.pending_user(email).await?;
        service.reissue(&user).await
    }

    async fn register_ann(service: &OtpService) -> User {
        service
            .register("Ann".into(), "ann@x.com".into(), "hash".into())
            .await
            .expect("register")
    }

    #[test]
    fn generated_codes_are_six_digits_without_leading_zero() {
        let shape = Regex::new(r"^[1-9][0-9]{5}$").unwrap();
        for _ in 0..10_000 {
            let code = generate();
            assert!(shape.is_match(&code), "bad code {code}");
        }
    }

    #[test]
    fn rendered_mail_carries_code_and_expiry() {
        let first = render(OtpMail::Verification, "ann@x.com", "123456", Duration::minutes(10));
        assert_eq!(first.subject, "Your Verification Code");
        assert!(first.html.contains("123456"));
        assert!(first.text.contains("expire in 10 minutes"));

        let again = render(OtpMail::Resend, "ann@x.com", "654321", Duration::minutes(10));
        assert_eq!(again.subject, "Your New Verification Code");
        assert!(again.html.contains("654321"));
    }

    #[test]
    fn short_lifetimes_are_worded_in_seconds() {
        let mail = render(OtpMail::Verification, "ann@x.com", "123456", Duration::seconds(30));
        assert!(mail.text.contains("expire in 30 seconds"));
        assert!(mail.html.contains("expire in 30 seconds"));

        assert_eq!(lifetime(Duration::minutes(1)), "1 minute");
        assert_eq!(lifetime(Duration::seconds(90)), "1 minute");
        assert_eq!(lifetime(Duration::hours(1)), "60 minutes");
    }

    #[tokio::test]
    async fn register_attaches_code_and_mails_it() {
        let (service, store, mailer) = service();
        let before = Utc::now();
        register_ann(&service).await;

        let user = store.find_by_email("ann@x.com").await.unwrap().unwrap();
        let otp = user.pending_otp().expect("code attached");
        assert!(!user.is_verified);
        assert!(otp.expires_at >= before + Duration::minutes(10));
        assert!(otp.expires_at <= Utc::now() + Duration::minutes(10));

        assert_eq!(mailer.last_code_for("ann@x.com").await, Some(otp.code));
    }

    #[tokio::test]
    async fn register_twice_keeps_first_record() {
        let (service, store, _mailer) = service();
        let first = register_ann(&service).await;

        let err = service
            .register("Other".into(), "ann@x.com".into(), "hash2".into())
            .await
            .unwrap_err();
        assert!(matches!(err, OtpError::EmailTaken));

        let stored = store.find_by_email("ann@x.com").await.unwrap().unwrap();
        assert_eq!(stored.id, first.id);
        assert_eq!(stored.name, "Ann");
        assert_eq!(stored.otp_code, first.otp_code);
    }

    #[tokio::test]
    async fn correct_code_validates_exactly_once() {
        let (service, _store, mailer) = service();
        register_ann(&service).await;
        let code = mailer.last_code_for("ann@x.com").await.unwrap();

        let user = service.validate("ann@x.com", &code).await.expect("valid");
        assert!(user.is_verified);
        assert!(user.pending_otp().is_none());

        let replay = service.validate("ann@x.com", &code).await.unwrap_err();
        assert!(matches!(replay, OtpError::InvalidOrExpired));
    }

    #[tokio::test]
    async fn wrong_code_and_expired_code_look_the_same() {
        let (service, store, mailer) = service();
        register_ann(&service).await;
        let code = mailer.last_code_for("ann@x.com").await.unwrap();
        let wrong = if code == "100000" { "100001" } else { "100000" };

        let err = service.validate("ann@x.com", wrong).await.unwrap_err();
        assert!(matches!(err, OtpError::InvalidOrExpired));

        let later = Utc::now() + Duration::minutes(OTP_TTL_MINUTES) + Duration::seconds(1);
        let err = service
            .validate_at("ann@x.com", &code, later)
            .await
            .unwrap_err();
        assert!(matches!(err, OtpError::InvalidOrExpired));

        assert!(!store.find_by_email("ann@x.com").await.unwrap().unwrap().is_verified);
    }

    #[tokio::test]
    async fn malformed_code_is_rejected_without_lookup() {
        let (service, _store, _mailer) = service();
        register_ann(&service).await;

        for code in ["", "12345", "1234567", "abcdef"] {
            let err = service.validate("ann@x.com", code).await.unwrap_err();
            assert!(matches!(err, OtpError::InvalidOrExpired));
        }
    }

    #[tokio::test]
    async fn reissue_invalidates_previous_code() {
        let (service, _store, mailer) = service();
        register_ann(&service).await;
        let old = mailer.last_code_for("ann@x.com").await.unwrap();

        let mut fresh = reissue(&service, "ann@x.com").await.expect("reissue");
        while fresh.code == old {
            fresh = reissue(&service, "ann@x.com").await.expect("reissue");
        }
        assert_eq!(mailer.last_code_for("ann@x.com").await, Some(fresh.code.clone()));
        assert_eq!(mailer.subjects().await.last().map(String::as_str), Some("Your New Verification Code"));

        let err = service.validate("ann@x.com", &old).await.unwrap_err();
        assert!(matches!(err, OtpError::InvalidOrExpired));
        service.validate("ann@x.com", &fresh.code).await.expect("fresh code");
    }

    #[tokio::test]
    async fn pending_user_refuses_unknown_and_verified_users() {
        let (service, _store, mailer) = service();
        let err = reissue(&service, "ghost@x.com").await.unwrap_err();
        assert!(matches!(err, OtpError::UserNotFound));

        register_ann(&service).await;
        let code = mailer.last_code_for("ann@x.com").await.unwrap();
        service.validate("ann@x.com", &code).await.unwrap();

        let err = reissue(&service, "ann@x.com").await.unwrap_err();
        assert!(matches!(err, OtpError::AlreadyVerified));
    }

    #[tokio::test]
    async fn mail_failure_surfaces_after_record_is_written() {
        let store = MemoryUserStore::new();
        let service = OtpService::new(
            Arc::new(store.clone()),
            Arc::new(FailingMailer),
            Duration::minutes(OTP_TTL_MINUTES),
        );

        let err = service
            .register("Ann".into(), "ann@x.com".into(), "hash".into())
            .await
            .unwrap_err();
        assert!(matches!(err, OtpError::Mail(_)));
        assert!(store.find_by_email("ann@x.com").await.unwrap().is_some());
    }
}
