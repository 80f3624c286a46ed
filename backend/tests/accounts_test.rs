//! Integration tests for accounts and dialog management

mod common;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chat_history_backend::api::auth::{
    change_password, login, logout, register, verify_token, ChangePasswordRequest,
    CredentialsRequest, TokenRequest,
};
use chat_history_backend::api::dialogs::{
    delete_dialog, list_dialogs, new_dialog, update_dialog, NewDialogRequest, UpdateTitleRequest,
    UserQuery, DEFAULT_DIALOG_TITLE,
};
use chat_history_backend::api::{build_router, health_check};
use chat_history_backend::chat::ExchangeRecord;
use common::test_state;

fn credentials(username: &str, password: &str) -> Json<CredentialsRequest> {
    Json(CredentialsRequest {
        username: username.to_string(),
        password: password.to_string(),
    })
}

fn user_query(username: &str) -> Query<UserQuery> {
    Query(UserQuery {
        username: username.to_string(),
    })
}

#[tokio::test]
async fn test_register_login_verify_logout() {
    let (state, _dir) = test_state(vec![]).await;

    let registered = register(State(state.clone()), credentials("alice", "secret"))
        .await
        .unwrap();
    assert_eq!(registered.0.token.len(), 64);

    let duplicate = register(State(state.clone()), credentials("alice", "other"))
        .await
        .unwrap_err();
    assert_eq!(duplicate.into_response().status(), StatusCode::BAD_REQUEST);

    let bad_login = login(State(state.clone()), credentials("alice", "wrong"))
        .await
        .unwrap_err();
    assert_eq!(bad_login.into_response().status(), StatusCode::BAD_REQUEST);

    let session = login(State(state.clone()), credentials("alice", "secret"))
        .await
        .unwrap();
    assert_eq!(session.0.user_id, registered.0.user_id);
    assert_ne!(session.0.token, registered.0.token);

    let token_request = |token: &str| {
        Json(TokenRequest {
            username: "alice".to_string(),
            token: token.to_string(),
        })
    };

    let stale = verify_token(State(state.clone()), token_request(&registered.0.token))
        .await
        .unwrap();
    assert!(!stale.0.valid);
    let current = verify_token(State(state.clone()), token_request(&session.0.token))
        .await
        .unwrap();
    assert!(current.0.valid);

    logout(State(state.clone()), token_request(&session.0.token))
        .await
        .unwrap();
    let after_logout = verify_token(State(state.clone()), token_request(&session.0.token))
        .await
        .unwrap();
    assert!(!after_logout.0.valid);

    let unknown = logout(
        State(state.clone()),
        Json(TokenRequest {
            username: "nobody".to_string(),
            token: String::new(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(unknown.into_response().status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_change_password() {
    let (state, _dir) = test_state(vec![]).await;
    register(State(state.clone()), credentials("alice", "old"))
        .await
        .unwrap();

    let request = |old: &str| {
        Json(ChangePasswordRequest {
            username: "alice".to_string(),
            old_password: old.to_string(),
            new_password: "new".to_string(),
        })
    };

    let wrong = change_password(State(state.clone()), request("nope"))
        .await
        .unwrap_err();
    assert_eq!(wrong.into_response().status(), StatusCode::BAD_REQUEST);

    let changed = change_password(State(state.clone()), request("old"))
        .await
        .unwrap();
    assert!(changed.0.success);

    assert!(login(State(state.clone()), credentials("alice", "old")).await.is_err());
    assert!(login(State(state.clone()), credentials("alice", "new")).await.is_ok());
}

#[tokio::test]
async fn test_dialog_lifecycle() {
    let (state, _dir) = test_state(vec![]).await;
    register(State(state.clone()), credentials("alice", "pw"))
        .await
        .unwrap();
    register(State(state.clone()), credentials("bob", "pw"))
        .await
        .unwrap();

    let untitled = new_dialog(
        State(state.clone()),
        Json(NewDialogRequest {
            username: "alice".to_string(),
            conversation_title: None,
        }),
    )
    .await
    .unwrap()
    .0
    .dialog_id;
    let titled = new_dialog(
        State(state.clone()),
        Json(NewDialogRequest {
            username: "alice".to_string(),
            conversation_title: Some("Math".to_string()),
        }),
    )
    .await
    .unwrap()
    .0
    .dialog_id;

    let alice = state.db.get_user_by_username("alice").await.unwrap().unwrap();
    state
        .db
        .save_exchange(&ExchangeRecord {
            dialog_id: untitled,
            user_id: alice.user_id,
            question: "hello".to_string(),
            answer: "hi".to_string(),
            reasoning: String::new(),
            media_ref: None,
        })
        .await
        .unwrap();

    let listed = list_dialogs(State(state.clone()), user_query("alice"))
        .await
        .unwrap()
        .0;
    let ids: Vec<i64> = listed.conversations.iter().map(|d| d.dialog_id).collect();
    assert_eq!(ids, vec![untitled, titled]);
    assert_eq!(listed.conversations[0].title, DEFAULT_DIALOG_TITLE);
    assert_eq!(listed.conversations[0].chat_records.len(), 2);
    assert_eq!(listed.conversations[0].chat_records[0].role, 1);
    assert_eq!(listed.conversations[0].chat_records[1].content, "hi");

    let renamed = update_dialog(
        State(state.clone()),
        Path(titled),
        Json(UpdateTitleRequest {
            title: "Algebra".to_string(),
            username: "alice".to_string(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(renamed.0.title, "Algebra");

    let foreign = delete_dialog(State(state.clone()), Path(titled), user_query("bob"))
        .await
        .unwrap_err();
    assert_eq!(foreign.into_response().status(), StatusCode::NOT_FOUND);

    delete_dialog(State(state.clone()), Path(untitled), user_query("alice"))
        .await
        .unwrap();
    let listed = list_dialogs(State(state.clone()), user_query("alice"))
        .await
        .unwrap()
        .0;
    assert_eq!(listed.conversations.len(), 1);
    assert_eq!(listed.conversations[0].title, "Algebra");
    assert!(state.db.get_chat_history(untitled).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let (state, _dir) = test_state(vec![]).await;
    let error = list_dialogs(State(state), user_query("ghost"))
        .await
        .unwrap_err();
    assert_eq!(error.into_response().status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_check() {
    let health = health_check().await;
    assert_eq!(health.0.status, "ok");
    assert_eq!(health.0.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_router_builds() {
    let (state, _dir) = test_state(vec![]).await;
    let _router = build_router(state);
}
