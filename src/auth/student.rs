use std::fmt;

/// The kinds of student credential the identity service can attest to.
/// Which one a guild requires is decided by its configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudentType {
    Alumnus,
    CurrentStudent,
}

/// Outcome of an authentication check against the identity service.
/// `member_code` is the opaque status code the service returned; it is only
/// meaningful when matched against a [`StudentType`]'s code set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    pub authenticated: bool,
    pub member_code: String,
}

impl AuthResult {
    /// The identity service rejected the member outright
    pub fn denied() -> Self {
        Self {
            authenticated: false,
            member_code: String::new(),
        }
    }
}

impl StudentType {
    /// The identity codes that satisfy this student type
    pub fn codes(self) -> &'static [&'static str] {
        match self {
            StudentType::Alumnus => &["Alumni"],
            StudentType::CurrentStudent => &["UG", "PGT", "PGR"],
        }
    }

    /// Whether an observed identity code satisfies this student type
    pub fn matches(self, code: &str) -> bool {
        self.codes().iter().any(|c| c.eq_ignore_ascii_case(code))
    }

    /// Judge an identity code the service returned for a member
    pub fn evaluate(self, code: &str) -> AuthResult {
        AuthResult {
            authenticated: self.matches(code),
            member_code: code.to_string(),
        }
    }

    /// Map an observed identity code back to the student type it belongs to,
    /// for explaining mismatches to members
    pub fn from_code(code: &str) -> Option<Self> {
        [StudentType::Alumnus, StudentType::CurrentStudent]
            .into_iter()
            .find(|t| t.matches(code))
    }

    pub fn label(self) -> &'static str {
        match self {
            StudentType::Alumnus => "alumnus",
            StudentType::CurrentStudent => "current student",
        }
    }

    pub fn plural_label(self) -> &'static str {
        match self {
            StudentType::Alumnus => "alumni",
            StudentType::CurrentStudent => "current students",
        }
    }
}

impl fmt::Display for StudentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
