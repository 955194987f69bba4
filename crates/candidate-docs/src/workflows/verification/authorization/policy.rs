use super::super::catalog::RejectionCode;
use super::super::domain::{Rejection, Role};

/// Codes that can never be overridden, whatever the pipeline reports.
pub static NON_OVERRIDABLE_CODES: [RejectionCode; 2] =
    [RejectionCode::DocumentTampered, RejectionCode::PhotoMismatch];

/// Minimum justification length, counted in characters after trimming.
pub const MIN_JUSTIFICATION_CHARS: usize = 10;

/// Local override rules layered on top of what the pipeline reports.
///
/// The local rules can only make an override harder: a deny-listed code stays blocked even
/// when the pipeline marks it overridable, and the required role never drops below admin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverridePolicy {
    minimum_role: Role,
    min_justification_chars: usize,
}

impl Default for OverridePolicy {
    fn default() -> Self {
        Self {
            minimum_role: Role::Admin,
            min_justification_chars: MIN_JUSTIFICATION_CHARS,
        }
    }
}

impl OverridePolicy {
    pub fn is_deny_listed(code: &RejectionCode) -> bool {
        NON_OVERRIDABLE_CODES.contains(code)
    }

    pub fn is_overridable(&self, rejection: &Rejection) -> bool {
        rejection.is_overridable && !Self::is_deny_listed(&rejection.code)
    }

    pub fn required_role(&self, rejection: &Rejection) -> Role {
        rejection.required_role.max(self.minimum_role)
    }

    pub fn min_justification_chars(&self) -> usize {
        self.min_justification_chars
    }

    /// Returns the trimmed character count when it falls short of the minimum.
    pub fn justification_shortfall(&self, justification: &str) -> Option<usize> {
        let found = justification.trim().chars().count();
        (found < self.min_justification_chars).then_some(found)
    }

    /// Apply the local rules to a fetched rejection so every consumer sees the same values.
    pub fn normalize(&self, rejection: &mut Rejection) {
        if Self::is_deny_listed(&rejection.code) && rejection.is_overridable {
            tracing::warn!(
                code = rejection.code.as_str(),
                "pipeline marked a deny-listed code as overridable"
            );
            rejection.is_overridable = false;
        }
        rejection.required_role = self.required_role(rejection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejection(code: RejectionCode) -> Rejection {
        let mut rejection = Rejection::new(code, "mismatch");
        rejection.is_overridable = true;
        rejection
    }

    #[test]
    fn deny_listed_codes_ignore_remote_flag() {
        let policy = OverridePolicy::default();
        assert!(!policy.is_overridable(&rejection(RejectionCode::DocumentTampered)));
        assert!(!policy.is_overridable(&rejection(RejectionCode::PhotoMismatch)));
        assert!(policy.is_overridable(&rejection(RejectionCode::CnicMismatch)));

        let mut blocked = rejection(RejectionCode::Other("custom".to_string()));
        blocked.is_overridable = false;
        assert!(!policy.is_overridable(&blocked));
    }

    #[test]
    fn required_role_never_drops_below_admin() {
        let policy = OverridePolicy::default();
        let mut staff = rejection(RejectionCode::NameMismatch);
        staff.required_role = Role::Staff;
        assert_eq!(policy.required_role(&staff), Role::Admin);

        staff.required_role = Role::SuperAdmin;
        assert_eq!(policy.required_role(&staff), Role::SuperAdmin);
    }

    #[test]
    fn justification_is_measured_after_trimming() {
        let policy = OverridePolicy::default();
        assert_eq!(policy.justification_shortfall("   short   "), Some(5));
        assert_eq!(policy.justification_shortfall("manually checked"), None);
        assert_eq!(policy.justification_shortfall("0123456789"), None);
    }

    #[test]
    fn normalize_rewrites_remote_values() {
        let policy = OverridePolicy::default();
        let mut tampered = rejection(RejectionCode::DocumentTampered);
        tampered.required_role = Role::Staff;
        policy.normalize(&mut tampered);
        assert!(!tampered.is_overridable);
        assert_eq!(tampered.required_role, Role::Admin);
    }
}
