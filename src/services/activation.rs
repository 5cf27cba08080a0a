use crate::models::entitlement::EntitlementSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationSignal {
    /// Premium newly switched on for an already-initialized session
    Activated,
    NoChange,
}

/// Decide whether a snapshot change is a fresh premium activation.
///
/// `has_completed_initial_check` guards the first check after login or app load:
/// before it, the previous snapshot is only the all-false default, so an existing
/// premium user would otherwise look like a brand new purchase.
pub fn detect(
    previous: &EntitlementSnapshot,
    next: &EntitlementSnapshot,
    has_completed_initial_check: bool,
) -> ActivationSignal {
    if !previous.is_premium && next.is_premium && has_completed_initial_check {
        ActivationSignal::Activated
    } else {
        ActivationSignal::NoChange
    }
}
