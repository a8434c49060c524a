const JWT_SOURCE: &str = include_str!("../src/auth/jwt.rs");
const MIDDLEWARE_SOURCE: &str = include_str!("../src/auth/middleware.rs");
const NOTIFICATIONS_API_SOURCE: &str = include_str!("../src/api/notifications.rs");

#[test]
fn expired_and_tampered_access_tokens_are_rejected() {
    assert!(
        JWT_SOURCE.contains("rejects_expired_tokens"),
        "JWT unit coverage must reject expired access tokens"
    );
    assert!(
        JWT_SOURCE.contains("rejects_tampered_tokens"),
        "JWT unit coverage must reject tokens signed with another secret"
    );
    assert!(
        JWT_SOURCE.contains("rejects_short_secrets"),
        "signing secrets shorter than 32 bytes must be refused"
    );
}

#[test]
fn rest_auth_accepts_header_or_cookie_and_nothing_else() {
    assert!(MIDDLEWARE_SOURCE.contains("missing bearer token"));
    assert!(MIDDLEWARE_SOURCE.contains("invalid bearer token"));
    assert!(
        MIDDLEWARE_SOURCE.contains("accepts_token_cookie"),
        "cookie transport must have regression coverage"
    );
}

#[test]
fn notifications_are_scoped_to_the_authenticated_user() {
    assert!(
        NOTIFICATIONS_API_SOURCE.contains("mark_read_returns_not_found_for_other_users_notification"),
        "marking another user's notification must not leak its existence"
    );
    assert!(NOTIFICATIONS_API_SOURCE.contains("lists_only_the_callers_notifications"));
}
