use std::sync::LazyLock;

use regex::Regex;
use validator::{ValidationError, ValidationErrors};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
});

/// Sri Lankan numbers, local (`0771234567`) or international (`+94771234567`).
static PHONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?:\+94|0)\d{9}$").unwrap());

static IMAGE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(https?://\S+|/uploads/\S+)$").unwrap());

pub fn validate_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

pub fn validate_phone(phone: &str) -> bool {
    PHONE.is_match(&phone.replace([' ', '-'], ""))
}

pub fn validate_image_url(url: &str) -> bool {
    IMAGE_URL.is_match(url)
}

pub fn phone_validator(phone: &str) -> Result<(), ValidationError> {
    if validate_phone(phone) {
        return Ok(());
    }
    let mut error = ValidationError::new("phone");
    error.message = Some("Invalid phone number".into());
    Err(error)
}

/// Picks one field error to report, alphabetically by field for stable responses.
pub fn first_field_error(errors: &ValidationErrors) -> (String, String) {
    let field_errors = errors.field_errors();
    let mut fields: Vec<_> = field_errors.keys().copied().collect();
    fields.sort_unstable();

    match fields.first() {
        Some(field) => {
            let message = field_errors[field]
                .first()
                .and_then(|error| error.message.as_ref().map(|m| m.to_string()))
                .unwrap_or_else(|| format!("{} is invalid", field));
            (field.to_string(), message)
        }
        None => ("request".to_string(), "Invalid request".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_local_and_international_phone_numbers() {
        assert!(validate_phone("0771234567"));
        assert!(validate_phone("+94771234567"));
        assert!(validate_phone("077 123 4567"));
        assert!(!validate_phone("12345"));
        assert!(!validate_phone("+1771234567"));
    }

    #[test]
    fn validates_emails() {
        assert!(validate_email("guide@slexplora.lk"));
        assert!(!validate_email("guide@"));
    }

    #[test]
    fn image_urls_must_be_absolute_or_uploaded() {
        assert!(validate_image_url("https://cdn.example.com/a.jpg"));
        assert!(validate_image_url("/uploads/abc.png"));
        assert!(!validate_image_url("a.png"));
        assert!(!validate_image_url(""));
    }

    #[test]
    fn reports_custom_phone_message() {
        let error = phone_validator("abc").unwrap_err();
        assert_eq!(error.message.unwrap(), "Invalid phone number");
    }
}
