//! A minimal REST-only stand-in for the GitHub pulls API, just enough to
//! drive `octocrab`'s `pulls()` client: list/get/create/update, with
//! optional failure injection for regression tests.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tokio::net::TcpListener;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MockState {
    #[serde(default)]
    pub prs: Vec<PrEntry>,
    #[serde(default = "default_owner")]
    pub repo_owner: String,
    #[serde(default = "default_repo")]
    pub repo_name: String,
    #[serde(default)]
    pub fail_next_request: Option<String>,
    #[serde(default)]
    pub fail_remaining: usize,
}

fn default_owner() -> String {
    "owner".to_string()
}

fn default_repo() -> String {
    "repo".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PrEntry {
    pub number: u64,
    pub state: String,
    pub title: String,
    pub body: String,
    pub head: RefInfo,
    pub base: RefInfo,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RefInfo {
    #[serde(rename = "ref")]
    pub ref_field: String,
    pub sha: String,
}

#[derive(Clone)]
struct AppState {
    state_path: PathBuf,
}

pub async fn start_mock_server(state_path: PathBuf) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("http://{addr}");

    let app_state = AppState { state_path };

    let app = Router::new()
        .route("/repos/{owner}/{repo}/pulls", get(list_prs).post(create_pr))
        .route(
            "/repos/{owner}/{repo}/pulls/{number}",
            get(get_pr).patch(update_pr),
        )
        .with_state(app_state);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    url
}

fn check_and_apply_failure(mock_state: &mut MockState, action_name: &str) -> bool {
    let Some(action) = &mock_state.fail_next_request else {
        return false;
    };
    if action != action_name {
        return false;
    }
    if mock_state.fail_remaining > 0 {
        mock_state.fail_remaining -= 1;
    }
    if mock_state.fail_remaining == 0 {
        mock_state.fail_next_request = None;
    }
    true
}

fn to_json(pr: &PrEntry) -> serde_json::Value {
    serde_json::json!({
        "id": pr.number,
        "number": pr.number,
        "state": pr.state,
        "title": pr.title,
        "body": pr.body,
        "head": { "ref": pr.head.ref_field, "sha": pr.head.sha },
        "base": { "ref": pr.base.ref_field, "sha": pr.base.sha },
        "html_url": format!("https://github.com/o/r/pull/{}", pr.number),
        "url": format!("https://api.github.com/repos/o/r/pulls/{}", pr.number),
    })
}

async fn list_prs(
    State(state): State<AppState>,
    Path((_owner, _repo)): Path<(String, String)>,
    Query(_params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, StatusCode> {
    let mut mock_state = read_state(&state.state_path);
    if check_and_apply_failure(&mut mock_state, "list_prs") {
        write_state(&state.state_path, &mock_state);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    let items: Vec<_> = mock_state.prs.iter().map(to_json).collect();
    Ok(Json(items))
}

async fn get_pr(
    State(state): State<AppState>,
    Path((_owner, _repo, number)): Path<(String, String, u64)>,
) -> Result<impl IntoResponse, StatusCode> {
    let mock_state = read_state(&state.state_path);
    mock_state
        .prs
        .iter()
        .find(|p| p.number == number)
        .map(|pr| Json(to_json(pr)))
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Deserialize)]
struct CreateBody {
    title: String,
    body: Option<String>,
    head: String,
    base: String,
}

async fn create_pr(
    State(state): State<AppState>,
    Path((_owner, _repo)): Path<(String, String)>,
    Json(payload): Json<CreateBody>,
) -> Result<impl IntoResponse, StatusCode> {
    let mut mock_state = read_state(&state.state_path);
    if check_and_apply_failure(&mut mock_state, "create_pr") {
        write_state(&state.state_path, &mock_state);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    let number = mock_state.prs.iter().map(|p| p.number).max().unwrap_or(0) + 1;
    let entry = PrEntry {
        number,
        state: "open".to_string(),
        title: payload.title,
        body: payload.body.unwrap_or_default(),
        head: RefInfo {
            ref_field: payload.head,
            sha: String::new(),
        },
        base: RefInfo {
            ref_field: payload.base,
            sha: String::new(),
        },
    };
    let json = to_json(&entry);
    mock_state.prs.push(entry);
    write_state(&state.state_path, &mock_state);
    Ok(Json(json))
}

#[derive(Deserialize, Default)]
struct UpdateBody {
    title: Option<String>,
    body: Option<String>,
    base: Option<String>,
    state: Option<String>,
}

async fn update_pr(
    State(state): State<AppState>,
    Path((_owner, _repo, number)): Path<(String, String, u64)>,
    Json(payload): Json<UpdateBody>,
) -> Result<impl IntoResponse, StatusCode> {
    let mut mock_state = read_state(&state.state_path);
    if check_and_apply_failure(&mut mock_state, "update_pr") {
        write_state(&state.state_path, &mock_state);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    let Some(pr) = mock_state.prs.iter_mut().find(|p| p.number == number) else {
        return Err(StatusCode::NOT_FOUND);
    };
    if let Some(title) = payload.title {
        pr.title = title;
    }
    if let Some(body) = payload.body {
        pr.body = body;
    }
    if let Some(base) = payload.base {
        pr.base.ref_field = base;
    }
    if let Some(st) = payload.state {
        pr.state = st;
    }
    let json = to_json(pr);
    write_state(&state.state_path, &mock_state);
    Ok(Json(json))
}

pub fn read_state(path: &PathBuf) -> MockState {
    if let Ok(content) = fs::read_to_string(path) {
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        MockState::default()
    }
}

pub fn write_state(path: &PathBuf, state: &MockState) {
    let content = serde_json::to_string(state).unwrap();
    fs::write(path, content).unwrap();
}
