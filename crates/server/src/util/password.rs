/// Checks a candidate password against the registration policy. Returns the
/// first failure as a message naming what is missing.
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain an uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("Password must contain a lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain a digit".to_string());
    }
    if !password.chars().any(|c| !c.is_ascii_alphanumeric()) {
        return Err("Password must contain a special character".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_conforming_password() {
        assert!(validate_password("Str0ng!pass").is_ok());
    }

    #[test]
    fn rejects_short_password() {
        let err = validate_password("S1!a").unwrap_err();
        assert!(err.contains("at least 8"));
    }

    #[test]
    fn names_the_missing_class() {
        assert!(validate_password("alllower1!").unwrap_err().contains("uppercase"));
        assert!(validate_password("ALLUPPER1!").unwrap_err().contains("lowercase"));
        assert!(validate_password("NoDigits!!").unwrap_err().contains("digit"));
        assert!(validate_password("NoSpecial1").unwrap_err().contains("special"));
    }
}
