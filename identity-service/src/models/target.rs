//! Contact targets: where one-time codes are delivered and how identities are keyed.

use std::fmt;

/// A normalised e-mail address or E.164 phone number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Email(String),
    Phone(String),
}

impl Target {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("Target is required".to_string());
        }

        if trimmed.starts_with('+') {
            let digits: String = trimmed[1..]
                .chars()
                .filter(|c| !matches!(c, ' ' | '-'))
                .collect();
            if (10..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) {
                return Ok(Target::Phone(format!("+{}", digits)));
            }
            return Err("Phone numbers must be in E.164 format (+ and 10-15 digits)".to_string());
        }

        let email = trimmed.to_lowercase();
        match email.split_once('@') {
            Some((local, domain))
                if !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
                    && !email.chars().any(char::is_whitespace) =>
            {
                Ok(Target::Email(email))
            }
            _ => Err("Target must be a valid email address or phone number".to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Target::Email(v) | Target::Phone(v) => v,
        }
    }

    pub fn is_email(&self) -> bool {
        matches!(self, Target::Email(_))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_trimmed_and_lowercased() {
        let target = Target::parse("  Alice@Example.COM ").unwrap();
        assert_eq!(target, Target::Email("alice@example.com".to_string()));
        assert!(target.is_email());
    }

    #[test]
    fn phone_must_be_e164() {
        assert_eq!(
            Target::parse("+234 801-234-5678").unwrap(),
            Target::Phone("+2348012345678".to_string())
        );
        assert!(Target::parse("+12345").is_err());
        assert!(Target::parse("+1234567890123456").is_err());
        assert!(Target::parse("+12345abcde").is_err());
    }

    #[test]
    fn rejects_malformed_email() {
        for bad in ["", "no-at-sign", "@example.com", "a@b", "a@.com", "a@b.com.", "a b@c.com", "a@b@c.com"] {
            assert!(Target::parse(bad).is_err(), "{} should be rejected", bad);
        }
    }
}
