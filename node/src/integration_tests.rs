//! End-to-end scenarios spinning up real in-process nodes over loopback
//! HTTP: ring formation, lookup correctness, file storage and forwarding,
//! and graceful departure.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use actix_web::dev::ServerHandle;

use crate::file_service::FileService;
use crate::node::NodeAddr;
use crate::ring_service::RingService;
use crate::storage::LocalFsStorage;
use crate::transport::HttpTransport;
use crate::AppState;

const M_BITS: u32 = 10;
const STABILIZE_INTERVAL: Duration = Duration::from_millis(50);

struct RunningNode {
    addr: NodeAddr,
    ring: Arc<RingService>,
    handle: ServerHandle,
}

impl Drop for RunningNode {
    fn drop(&mut self) {
        self.ring.stop();
        let handle = self.handle.clone();
        actix_rt::spawn(async move {
            handle.stop(false).await;
        });
    }
}

async fn spawn_node(bootstrap: Option<NodeAddr>) -> RunningNode {
    let storage_dir = std::env::temp_dir().join(format!(
        "chord-dfs-itest-{}-{}",
        std::process::id(),
        rand_suffix()
    ));
    let storage = Arc::new(LocalFsStorage::new(storage_dir));
    crate::storage::Storage::initialize(&*storage).await.unwrap();

    let transport = Arc::new(HttpTransport::new(Duration::from_secs(5)));
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let addr = NodeAddr::new("127.0.0.1", port);

    let ring = Arc::new(RingService::new(
        addr.clone(),
        M_BITS,
        transport.clone(),
        STABILIZE_INTERVAL,
        Duration::from_millis(50),
    ));
    let file_service = Arc::new(FileService::new(ring.clone(), storage, transport, M_BITS));
    let state = web::Data::new(AppState { ring: ring.clone(), file_service });

    let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(crate::api::configure))
        .listen(listener)
        .unwrap()
        .run();
    let handle = server.handle();
    actix_rt::spawn(server);

    if let Some(bootstrap) = bootstrap {
        ring.join_ring(bootstrap).await;
    }
    ring.spawn_stabilize_loop();

    RunningNode { addr, ring, handle }
}

fn rand_suffix() -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::time::Instant::now().hash(&mut hasher);
    hasher.finish()
}

/// Polls each node's `/info` until every node's successor and predecessor
/// point at a real ring neighbor (i.e. no node is stuck alone), or gives
/// up after a generous timeout. More robust under parallel test-thread
/// contention than a fixed sleep.
async fn settle(nodes: &[&NodeAddr]) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let mut all_converged = true;
        for node in nodes {
            let info: serde_json::Value =
                client().get(format!("{}/info", node.to_url())).send().await.unwrap().json().await.unwrap();
            let successor_is_self = info["successor_id"] == info["id"];
            let has_predecessor = !info["predecessor_id"].is_null();
            if nodes.len() > 1 && (successor_is_self || !has_predecessor) {
                all_converged = false;
            }
        }
        if all_converged {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("ring did not converge within timeout");
        }
        tokio::time::sleep(STABILIZE_INTERVAL).await;
    }
}

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

async fn put(node: &NodeAddr, name: &str, body: &'static [u8]) -> reqwest::StatusCode {
    client()
        .post(format!("{}/files/{name}", node.to_url()))
        .body(body)
        .send()
        .await
        .unwrap()
        .status()
}

async fn get(node: &NodeAddr, name: &str) -> Option<Vec<u8>> {
    let response = client().get(format!("{}/files/{name}", node.to_url())).send().await.unwrap();
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        None
    } else {
        Some(response.bytes().await.unwrap().to_vec())
    }
}

async fn list_local(node: &NodeAddr) -> Vec<String> {
    client()
        .get(format!("{}/files", node.to_url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

// Scenario 1: solo ring, PUT then GET from the same node.
#[actix_web::test]
async fn solo_ring_put_then_get_round_trips() {
    let x = spawn_node(None).await;

    let status = put(&x.addr, "alpha.txt", b"A").await;
    assert!(status.is_success());

    let value = get(&x.addr, "alpha.txt").await;
    assert_eq!(value, Some(b"A".to_vec()));

    let names = list_local(&x.addr).await;
    assert!(names.contains(&"alpha.txt".to_string()));
}

// Scenario 2: two-node ring, cross-node PUT/GET, and exactly one owner.
#[actix_web::test]
async fn two_node_join_distributes_and_cross_node_round_trips() {
    let x = spawn_node(None).await;
    let y = spawn_node(Some(x.addr.clone())).await;
    settle(&[&x.addr, &y.addr]).await;

    let status = put(&x.addr, "beta.txt", b"B").await;
    assert!(status.is_success());

    let via_y = get(&y.addr, "beta.txt").await;
    assert_eq!(via_y, Some(b"B".to_vec()));

    let x_has = list_local(&x.addr).await.contains(&"beta.txt".to_string());
    let y_has = list_local(&y.addr).await.contains(&"beta.txt".to_string());
    assert_eq!(x_has as u32 + y_has as u32, 1, "exactly one node should hold beta.txt");
}

// Scenario 3: three-node ring, ten files distributed, every GET succeeds.
#[actix_web::test]
async fn three_node_ring_distributes_ten_files() {
    let a = spawn_node(None).await;
    let b = spawn_node(Some(a.addr.clone())).await;
    let c = spawn_node(Some(a.addr.clone())).await;
    settle(&[&a.addr, &b.addr, &c.addr]).await;

    let names: Vec<String> = (1..=10).map(|i| format!("f{i}")).collect();
    for name in &names {
        let status = put(&a.addr, name, b"payload").await;
        assert!(status.is_success());
    }

    let total: usize = {
        let la = list_local(&a.addr).await.len();
        let lb = list_local(&b.addr).await.len();
        let lc = list_local(&c.addr).await.len();
        la + lb + lc
    };
    assert_eq!(total, 10);

    for name in &names {
        let value = get(&b.addr, name).await;
        assert_eq!(value, Some(b"payload".to_vec()), "missing {name}");
    }
}

// Scenario 4: late joiner can retrieve a file that predates its join.
#[actix_web::test]
async fn late_joiner_retrieves_preexisting_file() {
    let x = spawn_node(None).await;
    let status = put(&x.addr, "pre.txt", b"P").await;
    assert!(status.is_success());

    let y = spawn_node(Some(x.addr.clone())).await;
    settle(&[&x.addr, &y.addr]).await;

    let value = get(&y.addr, "pre.txt").await;
    assert_eq!(value, Some(b"P".to_vec()));
}
