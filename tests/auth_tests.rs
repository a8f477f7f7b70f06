//! AuthUser extractor behavior: bearer token validation, the lazy profile
//! mirror, role resolution on extraction, and the local-only header bypass.

mod common;

use axum::{
    extract::FromRequestParts,
    http::{Method, Request, StatusCode, request::Parts},
};
use common::{MockRepo, build_state, build_state_with_admins, create_token};
use sfru_portal::{
    auth::AuthUser,
    billing::MockSubscriptionService,
    config::Env,
    repository::Repository,
    roles::{AdminAllowList, Role},
};
use uuid::Uuid;

fn get_request_parts(method: Method, uri: &str) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(())
        .unwrap();
    request.into_parts().0
}

fn parts_with_bearer(token: &str) -> Parts {
    let request = Request::builder()
        .method(Method::GET)
        .uri("/me")
        .header("Authorization", format!("Bearer {}", token))
        .body(())
        .unwrap();
    request.into_parts().0
}

#[tokio::test]
async fn missing_authorization_header_is_unauthorized() {
    let state = build_state(
        MockRepo::default(),
        MockSubscriptionService::unsubscribed(),
        Env::Production,
    );
    let mut parts = get_request_parts(Method::GET, "/me");

    let result = AuthUser::from_request_parts(&mut parts, &state).await;
    assert_eq!(result.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn valid_token_resolves_identity_and_roles() {
    let id = Uuid::new_v4();
    let state = build_state(
        MockRepo::default().with_user(id, "editor@example.com", &[Role::Editor]),
        MockSubscriptionService::unsubscribed(),
        Env::Production,
    );
    let token = create_token(id, "editor@example.com", 3600);
    let mut parts = parts_with_bearer(&token);

    let user = AuthUser::from_request_parts(&mut parts, &state)
        .await
        .unwrap();

    assert_eq!(user.id, id);
    assert_eq!(user.email, "editor@example.com");
    assert!(user.roles.has_role(Role::Editor));
    assert!(!user.roles.is_admin());
}

#[tokio::test]
async fn expired_token_is_unauthorized() {
    let id = Uuid::new_v4();
    let state = build_state(
        MockRepo::default().with_user(id, "late@example.com", &[]),
        MockSubscriptionService::unsubscribed(),
        Env::Production,
    );
    let token = create_token(id, "late@example.com", -3600);
    let mut parts = parts_with_bearer(&token);

    let result = AuthUser::from_request_parts(&mut parts, &state).await;
    assert_eq!(result.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn garbage_token_is_unauthorized() {
    let state = build_state(
        MockRepo::default(),
        MockSubscriptionService::unsubscribed(),
        Env::Production,
    );
    let mut parts = parts_with_bearer("not.a.jwt");

    let result = AuthUser::from_request_parts(&mut parts, &state).await;
    assert_eq!(result.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn non_bearer_scheme_is_unauthorized() {
    let state = build_state(
        MockRepo::default(),
        MockSubscriptionService::unsubscribed(),
        Env::Production,
    );
    let request = Request::builder()
        .method(Method::GET)
        .uri("/me")
        .header("Authorization", "Basic dXNlcjpwYXNz")
        .body(())
        .unwrap();
    let mut parts = request.into_parts().0;

    let result = AuthUser::from_request_parts(&mut parts, &state).await;
    assert_eq!(result.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn first_contact_creates_the_profile_mirror() {
    let id = Uuid::new_v4();
    // No pre-seeded user row: extraction should upsert one lazily.
    let state = build_state(
        MockRepo::default(),
        MockSubscriptionService::unsubscribed(),
        Env::Production,
    );
    let token = create_token(id, "new@example.com", 3600);
    let mut parts = parts_with_bearer(&token);

    let user = AuthUser::from_request_parts(&mut parts, &state)
        .await
        .unwrap();

    assert_eq!(user.email, "new@example.com");
    // A brand-new profile has no role rows, so the baseline applies.
    assert_eq!(user.roles.labels(), vec!["user"]);
    assert!(state.repo.get_user(id).await.is_some());
}

#[tokio::test]
async fn allow_listed_email_is_admin_on_extraction() {
    let id = Uuid::new_v4();
    let state = build_state_with_admins(
        MockRepo::default().with_user(id, "owner@example.com", &[]),
        MockSubscriptionService::unsubscribed(),
        Env::Production,
        AdminAllowList::new(vec!["owner@example.com".to_string()], vec![]),
    );
    let token = create_token(id, "owner@example.com", 3600);
    let mut parts = parts_with_bearer(&token);

    let user = AuthUser::from_request_parts(&mut parts, &state)
        .await
        .unwrap();

    assert!(user.roles.is_admin());
    assert_eq!(user.roles.labels(), vec!["admin", "user"]);
}

#[tokio::test]
async fn local_bypass_header_works_for_known_profiles() {
    let id = Uuid::new_v4();
    let state = build_state(
        MockRepo::default().with_user(id, "dev@example.com", &[Role::Editor]),
        MockSubscriptionService::unsubscribed(),
        Env::Local,
    );
    let request = Request::builder()
        .method(Method::GET)
        .uri("/me")
        .header("x-user-id", id.to_string())
        .body(())
        .unwrap();
    let mut parts = request.into_parts().0;

    let user = AuthUser::from_request_parts(&mut parts, &state)
        .await
        .unwrap();

    assert_eq!(user.id, id);
    assert!(user.roles.has_role(Role::Editor));
}

#[tokio::test]
async fn local_bypass_requires_an_existing_profile() {
    let state = build_state(
        MockRepo::default(),
        MockSubscriptionService::unsubscribed(),
        Env::Local,
    );
    let request = Request::builder()
        .method(Method::GET)
        .uri("/me")
        .header("x-user-id", Uuid::new_v4().to_string())
        .body(())
        .unwrap();
    let mut parts = request.into_parts().0;

    let result = AuthUser::from_request_parts(&mut parts, &state).await;
    assert_eq!(result.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bypass_header_is_ignored_in_production() {
    let id = Uuid::new_v4();
    let state = build_state(
        MockRepo::default().with_user(id, "dev@example.com", &[Role::Admin]),
        MockSubscriptionService::unsubscribed(),
        Env::Production,
    );
    let request = Request::builder()
        .method(Method::GET)
        .uri("/me")
        .header("x-user-id", id.to_string())
        .body(())
        .unwrap();
    let mut parts = request.into_parts().0;

    let result = AuthUser::from_request_parts(&mut parts, &state).await;
    assert_eq!(result.unwrap_err(), StatusCode::UNAUTHORIZED);
}
