use super::*;
use crate::{GoogleOAuthConfig, GoogleTokens};
use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct SheetState {
    writes: Arc<Mutex<Vec<(String, String, serde_json::Value)>>>,
}

async fn metadata_handler(Path(id): Path<String>) -> Json<serde_json::Value> {
    if id == "empty-sheet" {
        return Json(serde_json::json!({ "sheets": [] }));
    }
    Json(serde_json::json!({
        "sheets": [
            { "properties": { "title": "Applications" } },
            { "properties": { "title": "Archive" } }
        ]
    }))
}

async fn update_handler(
    State(state): State<SheetState>,
    Path((id, range)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    assert_eq!(
        query.get("valueInputOption").map(String::as_str),
        Some("RAW")
    );
    state.writes.lock().expect("lock").push((id, range, body));
    Json(serde_json::json!({ "updatedCells": 3 }))
}

async fn spawn_sheets() -> (String, SheetState) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = SheetState::default();
    let app = Router::new()
        .route("/v4/spreadsheets/:id", get(metadata_handler))
        .route("/v4/spreadsheets/:id/values/:range", put(update_handler))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

fn client(base: &str) -> SheetsClient {
    let session = GoogleSession::new(
        reqwest::Client::new(),
        GoogleOAuthConfig::new("id".into(), "secret".into(), "http://cb".into()),
        GoogleTokens {
            access_token: "token".into(),
            refresh_token: None,
        },
    );
    SheetsClient::with_base_url(Arc::new(session), base)
}

#[test]
fn row_range_quotes_titles_that_need_it() {
    assert_eq!(row_range("Sheet1", 4), "Sheet1!A4:C4");
    assert_eq!(row_range("Job Hunt", 2), "'Job Hunt'!A2:C2");
    assert_eq!(row_range("Bob's", 3), "'Bob''s'!A3:C3");
}

#[tokio::test]
async fn first_sheet_title_picks_first_worksheet() {
    let (base, _state) = spawn_sheets().await;
    let title = client(&base)
        .first_sheet_title("sheet-123")
        .await
        .expect("title");
    assert_eq!(title, "Applications");

    let err = client(&base).first_sheet_title("empty-sheet").await;
    assert!(err.is_err());
}

#[tokio::test]
async fn write_row_puts_single_row_of_raw_values() {
    let (base, state) = spawn_sheets().await;
    let values = vec![
        "Engineer".to_string(),
        "Acme".to_string(),
        "applied".to_string(),
    ];
    client(&base)
        .write_row("sheet-123", "'Job Hunt'!A2:C2", &values)
        .await
        .expect("write");

    let writes = state.writes.lock().expect("lock").clone();
    assert_eq!(writes.len(), 1);
    let (id, range, body) = &writes[0];
    assert_eq!(id, "sheet-123");
    assert_eq!(range, "'Job Hunt'!A2:C2");
    assert_eq!(body["majorDimension"], "ROWS");
    assert_eq!(
        body["values"],
        serde_json::json!([["Engineer", "Acme", "applied"]])
    );
}
