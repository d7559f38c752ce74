//! Signup and login form validation.
//!
//! Validation is synchronous and field-level: each invalid field gets one
//! message. When a field breaks several rules, the last rule checked wins.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    FullName,
    Email,
    Handle,
    Password,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::FullName => "fullName",
            Field::Email => "email",
            Field::Handle => "handle",
            Field::Password => "password",
        })
    }
}

/// Per-field validation messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(Vec<(Field, &'static str)>);

impl FieldErrors {
    fn set(&mut self, field: Field, message: &'static str) {
        match self.0.iter_mut().find(|(f, _)| *f == field) {
            Some(slot) => slot.1 = message,
            None => self.0.push((field, message)),
        }
    }

    pub fn get(&self, field: Field) -> Option<&'static str> {
        self.0.iter().find(|(f, _)| *f == field).map(|(_, m)| *m)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &'static str)> + '_ {
        self.0.iter().copied()
    }

    fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, message)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

pub const NAME_TOO_SHORT: &str = "Name is too short";
pub const INVALID_EMAIL: &str = "Invalid email address";
pub const HANDLE_TOO_SHORT: &str = "Handle must be 3+ characters";
pub const HANDLE_CHARSET: &str = "Only letters, numbers and underscores";
pub const PASSWORD_TOO_SHORT: &str = "Password must be 8+ characters";

/// First onboarding step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignupBasics {
    pub full_name: String,
    pub email: String,
    pub handle: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl SignupBasics {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        if self.full_name.chars().count() < 2 {
            errors.set(Field::FullName, NAME_TOO_SHORT);
        }
        if !is_valid_email(&self.email) {
            errors.set(Field::Email, INVALID_EMAIL);
        }
        if self.handle.chars().count() < 3 {
            errors.set(Field::Handle, HANDLE_TOO_SHORT);
        }
        if !is_valid_handle(&self.handle) {
            errors.set(Field::Handle, HANDLE_CHARSET);
        }
        errors.into_result()
    }
}

impl LoginForm {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        if !is_valid_email(&self.email) {
            errors.set(Field::Email, INVALID_EMAIL);
        }
        if self.password.chars().count() < 8 {
            errors.set(Field::Password, PASSWORD_TOO_SHORT);
        }
        errors.into_result()
    }
}

/// Non-empty `[a-z0-9_]`.
pub fn is_valid_handle(handle: &str) -> bool {
    !handle.is_empty()
        && handle
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// `local@domain.tld` with no whitespace, no empty labels in the domain and
/// a TLD of at least two letters.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || email.chars().any(char::is_whitespace) {
        return false;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    let labels_ok = labels.iter().all(|l| {
        !l.is_empty()
            && !l.starts_with('-')
            && !l.ends_with('-')
            && l.chars().all(|c| c.is_alphanumeric() || c == '-')
    });
    let tld_ok = labels
        .last()
        .is_some_and(|tld| tld.chars().count() >= 2 && tld.chars().all(char::is_alphabetic));
    labels_ok && tld_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basics(name: &str, email: &str, handle: &str) -> SignupBasics {
        SignupBasics {
            full_name: name.into(),
            email: email.into(),
            handle: handle.into(),
        }
    }

    #[test]
    fn test_valid_signup() {
        assert!(basics("Jun Kim", "jun@personar.me", "jun_dev").validate().is_ok());
    }

    #[test]
    fn test_signup_field_messages() {
        let errors = basics("J", "not-an-email", "ab").validate().unwrap_err();
        assert_eq!(errors.get(Field::FullName), Some(NAME_TOO_SHORT));
        assert_eq!(errors.get(Field::Email), Some(INVALID_EMAIL));
        assert_eq!(errors.get(Field::Handle), Some(HANDLE_TOO_SHORT));
    }

    #[test]
    fn test_handle_charset() {
        let errors = basics("Jun Kim", "jun@personar.me", "Jun-Dev").validate().unwrap_err();
        assert_eq!(errors.get(Field::Handle), Some(HANDLE_CHARSET));
        assert_eq!(errors.get(Field::Email), None);
    }

    #[test]
    fn test_handle_last_rule_wins() {
        let errors = basics("Jun Kim", "jun@personar.me", "J!").validate().unwrap_err();
        assert_eq!(errors.get(Field::Handle), Some(HANDLE_CHARSET));
        assert_eq!(errors.iter().count(), 1);
    }

    #[test]
    fn test_login() {
        let ok = LoginForm {
            email: "owen@personar.me".into(),
            password: "correct horse".into(),
        };
        assert!(ok.validate().is_ok());

        let short = LoginForm {
            email: "owen@personar.me".into(),
            password: "1234567".into(),
        };
        let errors = short.validate().unwrap_err();
        assert_eq!(errors.get(Field::Password), Some(PASSWORD_TOO_SHORT));
        assert_eq!(errors.to_string(), "password: Password must be 8+ characters");
    }

    #[test]
    fn test_email_rules() {
        for good in ["a@b.co", "first.last@sub.example.org", "x_y+z@personar.me"] {
            assert!(is_valid_email(good), "{good}");
        }
        for bad in ["", "@b.co", "a@", "a@b", "a@b.c", "a b@c.de", "a@@b.co", "a@.b.co", ".a@b.co", "a@b-.co"] {
            assert!(!is_valid_email(bad), "{bad}");
        }
    }
}
