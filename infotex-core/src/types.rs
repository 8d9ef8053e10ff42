//! Core data type definitions

use serde::{Deserialize, Serialize};

/// Identifier of the signed-in principal, as issued by the backend
pub type UserId = i64;

/// Kind of account behind a session; drives route admission decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    /// Job seeker browsing and applying to offers
    #[serde(alias = "candidato")]
    Candidate,
    /// Employer posting offers and reviewing applicants
    #[serde(alias = "empresa")]
    Company,
    /// Maintainer of the reference catalogs
    #[serde(alias = "administrador")]
    Admin,
}

impl UserType {
    pub const ALL: [UserType; 3] = [UserType::Candidate, UserType::Company, UserType::Admin];
}

impl std::fmt::Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserType::Candidate => write!(f, "candidate"),
            UserType::Company => write!(f, "company"),
            UserType::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "candidate" | "candidato" => Ok(UserType::Candidate),
            "company" | "empresa" => Ok(UserType::Company),
            "admin" | "administrador" => Ok(UserType::Admin),
            _ => Err(format!("Unknown user type: {}", s)),
        }
    }
}
