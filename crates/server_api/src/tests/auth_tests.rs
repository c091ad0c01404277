use super::*;

fn keys(secret: &str) -> AuthKeys {
    AuthKeys::from_secret(&Secret::new(secret.to_string()))
}

#[test]
fn session_token_names_its_user() {
    let keys = keys("test-secret");
    let token = keys.issue_session(UserId(7)).expect("token");

    let decoded = decode::<serde_json::Value>(
        &token,
        &DecodingKey::from_secret(b"test-secret"),
        &Validation::default(),
    )
    .expect("decode");
    assert_eq!(decoded.claims["sub"], "user:7");
    assert_eq!(decoded.claims["purpose"], "session");
    assert_eq!(keys.verify_session(&token).expect("verify"), UserId(7));
}

#[test]
fn token_signed_with_another_key_is_rejected() {
    let token = keys("other-secret").issue_session(UserId(7)).expect("token");
    let err = keys("test-secret").verify_session(&token).expect_err("forged");
    assert_eq!(err.code, ErrorCode::Unauthorized);
}

#[test]
fn oauth_state_and_session_are_not_interchangeable() {
    let keys = keys("test-secret");
    let state = keys.issue_oauth_state(UserId(7)).expect("state");
    let session = keys.issue_session(UserId(7)).expect("session");

    assert_eq!(keys.verify_oauth_state(&state).expect("state"), UserId(7));
    assert!(keys.verify_session(&state).is_err());
    assert!(keys.verify_oauth_state(&session).is_err());
}

#[test]
fn expired_token_is_rejected() {
    let now = Utc::now();
    let claims = Claims {
        sub: "user:7".into(),
        purpose: TokenPurpose::Session,
        iat: (now - Duration::hours(2)).timestamp(),
        exp: (now - Duration::hours(1)).timestamp(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"test-secret"),
    )
    .expect("encode");

    assert!(keys("test-secret").verify_session(&token).is_err());
}

#[test]
fn authorize_requires_matching_live_session() {
    let keys = keys("test-secret");
    let token = keys.issue_session(UserId(7)).expect("token");

    authorize(&keys, Some(&token), UserId(7)).expect("own data");

    for (token, user) in [
        (None, UserId(7)),
        (Some(""), UserId(7)),
        (Some("garbage"), UserId(7)),
        (Some(token.as_str()), UserId(8)),
    ] {
        let err = authorize(&keys, token, user).expect_err("denied");
        assert_eq!(err.code, ErrorCode::Unauthorized);
    }
}
