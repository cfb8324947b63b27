use keystone::auth::Role;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    /// Defaults to `reader`
    #[serde(default, alias = "roles")]
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signup_role_is_optional() {
        let req: SignupRequest =
            serde_json::from_str(r#"{"username":"alice","password":"pw123"}"#).unwrap();
        assert_eq!(req.role, None);
        assert_eq!(req.role.unwrap_or_default(), Role::Reader);
    }

    #[test]
    fn test_signup_accepts_roles_alias() {
        let req: SignupRequest =
            serde_json::from_str(r#"{"username":"alice","password":"pw123","roles":"sysadmin"}"#)
                .unwrap();
        assert_eq!(req.role, Some(Role::SystemAdmin));
    }

    #[test]
    fn test_signup_rejects_unknown_role() {
        let result: Result<SignupRequest, _> =
            serde_json::from_str(r#"{"username":"alice","password":"pw123","role":"root"}"#);
        assert!(result.is_err());
    }
}
