use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tokio::time::sleep;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserResponse {
    id: String,
    name: String,
    organizations: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisitResponse {
    id: String,
    user_id: String,
    status: String,
    notes: Option<String>,
    user_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InTownResponse {
    outcome: String,
    visit: VisitResponse,
}

struct TestServer {
    base_url: String,
    child: Child,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(unix)]
mod cleanup {
    use once_cell::sync::Lazy;
    use std::sync::{Mutex, Once};

    static REGISTER: Once = Once::new();
    static PIDS: Lazy<Mutex<Vec<i32>>> = Lazy::new(|| Mutex::new(Vec::new()));

    pub fn register(pid: u32) {
        if let Ok(mut pids) = PIDS.lock() {
            pids.push(pid as i32);
        }
        REGISTER.call_once(|| unsafe {
            libc::atexit(on_exit);
        });
    }

    extern "C" fn on_exit() {
        if let Ok(pids) = PIDS.lock() {
            for pid in pids.iter().copied().filter(|pid| *pid > 0) {
                unsafe {
                    libc::kill(pid, libc::SIGTERM);
                }
            }
        }
    }
}

fn pick_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn unique_data_dir() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!("visit_board_http_{}_{}", std::process::id(), nanos));
    path.to_string_lossy().to_string()
}

async fn wait_until_ready(base_url: &str) {
    let client = Client::new();
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if let Ok(resp) = client.get(format!("{base_url}/api/session")).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        if Instant::now() > deadline {
            panic!("server did not become ready");
        }
        sleep(Duration::from_millis(100)).await;
    }
}

async fn spawn_server() -> TestServer {
    let port = pick_free_port();
    let child = Command::new(env!("CARGO_BIN_EXE_visit_board"))
        .env("PORT", port.to_string())
        .env("APP_DATA_DIR", unique_data_dir())
        .env("RUST_LOG", "info")
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn server");

    #[cfg(unix)]
    cleanup::register(child.id());

    let base_url = format!("http://127.0.0.1:{port}");
    wait_until_ready(&base_url).await;

    TestServer { base_url, child }
}

async fn register(client: &Client, base_url: &str, body: Value) -> UserResponse {
    let response = client
        .post(format!("{base_url}/api/register"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    response.json().await.unwrap()
}

async fn toggle_in_town(client: &Client, base_url: &str) -> InTownResponse {
    client
        .post(format!("{base_url}/api/visits/in-town"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn user_visits(client: &Client, base_url: &str, user_id: &str) -> Vec<VisitResponse> {
    client
        .get(format!("{base_url}/api/visits?userId={user_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn post(client: &Client, base_url: &str, path: &str) -> reqwest::Response {
    client
        .post(format!("{base_url}{path}"))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn http_mark_in_town_toggles_one_visit() {
    let server = spawn_server().await;
    let client = Client::new();

    let user = register(
        &client,
        &server.base_url,
        json!({ "name": "Alex Rivera", "organizations": ["Corps A", "Corps A"] }),
    )
    .await;
    assert_eq!(user.name, "Alex Rivera");
    assert_eq!(user.organizations, ["Corps A"]);

    let first = toggle_in_town(&client, &server.base_url).await;
    assert_eq!(first.outcome, "arrived");
    assert_eq!(first.visit.user_id, user.id);
    assert_eq!(first.visit.status, "current");
    assert_eq!(first.visit.notes.as_deref(), Some("Currently in town!"));

    let visits = user_visits(&client, &server.base_url, &user.id).await;
    assert_eq!(visits.len(), 1);
    assert_eq!(visits.iter().filter(|visit| visit.status == "current").count(), 1);
    assert_eq!(visits[0].user_name.as_deref(), Some("Alex Rivera"));

    let second = toggle_in_town(&client, &server.base_url).await;
    assert_eq!(second.outcome, "left");
    assert_eq!(second.visit.id, first.visit.id);
    assert_eq!(second.visit.status, "planned");

    let visits = user_visits(&client, &server.base_url, &user.id).await;
    assert_eq!(visits.len(), 1);
    assert!(visits.iter().all(|visit| visit.status == "planned"));
}

#[tokio::test]
async fn http_suggestions_listed_per_visit() {
    let server = spawn_server().await;
    let client = Client::new();

    register(&client, &server.base_url, json!({ "name": "Kim" })).await;
    let visit: VisitResponse = client
        .post(format!("{}/api/visits", server.base_url))
        .json(&json!({ "startDate": "2025-09-01", "endDate": "2025-09-03", "notes": "conference" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(visit.status, "planned");

    for title in ["Hike", "Museum"] {
        let response = client
            .post(format!("{}/api/suggestions", server.base_url))
            .json(&json!({ "visitId": visit.id, "title": title, "description": "together" }))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        let added: Value = response.json().await.unwrap();
        assert_eq!(added["visitFound"], json!(true));
    }

    let suggestions: Vec<Value> = client
        .get(format!("{}/api/visits/{}/suggestions", server.base_url, visit.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let titles: Vec<_> = suggestions.iter().map(|s| s["title"].as_str().unwrap()).collect();
    assert_eq!(titles, ["Hike", "Museum"]);
    assert_eq!(suggestions[0]["userName"], json!("Kim"));
}

#[tokio::test]
async fn http_rejects_invalid_requests() {
    let server = spawn_server().await;
    let client = Client::new();

    let blank = client
        .post(format!("{}/api/register", server.base_url))
        .json(&json!({ "name": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);

    let unknown = client
        .post(format!("{}/api/visits/does-not-exist/status", server.base_url))
        .json(&json!({ "status": "planned" }))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn http_logout_keeps_directory_entry() {
    let server = spawn_server().await;
    let client = Client::new();

    let user = register(&client, &server.base_url, json!({ "name": "Lee" })).await;
    let response = client
        .post(format!("{}/api/logout", server.base_url))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let session: Option<Value> = client
        .get(format!("{}/api/session", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(session.is_none());

    let suggestion = client
        .post(format!("{}/api/suggestions", server.base_url))
        .json(&json!({ "visitId": "x", "title": "t", "description": "d" }))
        .send()
        .await
        .unwrap();
    assert_eq!(suggestion.status(), StatusCode::CONFLICT);

    let users: Vec<UserResponse> = client
        .get(format!("{}/api/users", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(users.iter().any(|entry| entry.id == user.id));
}

#[tokio::test]
async fn http_leave_removes_directory_entry() {
    let server = spawn_server().await;
    let client = Client::new();

    let stays = register(&client, &server.base_url, json!({ "name": "Ana" })).await;
    assert!(post(&client, &server.base_url, "/api/logout").await.status().is_success());
    let leaver = register(&client, &server.base_url, json!({ "name": "Ben" })).await;
    assert_ne!(stays.id, leaver.id);

    let left: Option<UserResponse> = post(&client, &server.base_url, "/api/leave")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(left.map(|user| user.id), Some(leaver.id.clone()));

    let users: Vec<UserResponse> = client
        .get(format!("{}/api/users", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ids: Vec<_> = users.iter().map(|user| user.id.as_str()).collect();
    assert_eq!(ids, [stays.id.as_str()]);

    let session: Option<Value> = client
        .get(format!("{}/api/session", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(session.is_none());

    let again: Option<Value> = post(&client, &server.base_url, "/api/leave")
        .await
        .json()
        .await
        .unwrap();
    assert!(again.is_none());
}

#[tokio::test]
async fn http_groups_users_by_city() {
    let server = spawn_server().await;
    let client = Client::new();

    for (name, city) in [("Ana", "Lisbon"), ("Ben", "Oslo"), ("Dee", "Lisbon")] {
        register(&client, &server.base_url, json!({ "name": name, "city": city })).await;
        assert!(post(&client, &server.base_url, "/api/logout").await.status().is_success());
    }
    register(&client, &server.base_url, json!({ "name": "Cy" })).await;

    let groups: Vec<Value> = client
        .get(format!("{}/api/users/grouped?by=city", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let keys: Vec<_> = groups.iter().map(|group| group["key"].as_str().unwrap()).collect();
    assert_eq!(keys, ["Lisbon", "Oslo"]);
    let lisbon: Vec<_> = groups[0]["users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|user| user["name"].as_str().unwrap())
        .collect();
    assert_eq!(lisbon, ["Ana", "Dee"]);
}

#[tokio::test]
async fn http_index_forms_drive_the_store() {
    let server = spawn_server().await;
    let client = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    let response = client
        .post(format!("{}/register", server.base_url))
        .form(&[("name", "Kim"), ("organizations", "Corps A"), ("occupation", "Guide")])
        .send()
        .await
        .unwrap();
    assert!(response.status().is_redirection());

    let response = client
        .post(format!("{}/visits", server.base_url))
        .form(&[("start_date", "2025-09-01"), ("end_date", ""), ("notes", "")])
        .send()
        .await
        .unwrap();
    assert!(response.status().is_redirection());

    let active: Vec<VisitResponse> = client
        .get(format!("{}/api/visits/active", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(active.len(), 1);

    let response = client
        .post(format!("{}/suggestions", server.base_url))
        .form(&[
            ("visit_id", active[0].id.as_str()),
            ("title", "Hike"),
            ("description", "Early start"),
            ("suggested_date", ""),
        ])
        .send()
        .await
        .unwrap();
    assert!(response.status().is_redirection());

    let page = client
        .get(server.base_url.clone())
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(page.contains("Guide"));
    assert!(page.contains("<strong>Hike</strong>"));

    let response = post(&client, &server.base_url, "/leave").await;
    assert!(response.status().is_redirection());
    let session: Option<Value> = client
        .get(format!("{}/api/session", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(session.is_none());
}
