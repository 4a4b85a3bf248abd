//! HTTP boundary adapter: translates the client surface (`/files/*`) and
//! the peer surface (`/chord/*`) onto the ring and file services. No
//! routing logic lives here beyond request parsing and status mapping.

use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::node::{Identity, NodeAddr};
use crate::transport::{FindSuccessorRequest, JoinRequest, LeaveRequest, NotifyRequest, PredecessorResponse};
use crate::AppState;

// --- Client surface: /files -------------------------------------------------

#[post("/files/{name}")]
async fn upload_file(name: web::Path<String>, body: web::Bytes, state: web::Data<AppState>) -> impl Responder {
    let name = name.into_inner();
    if name.is_empty() {
        return HttpResponse::BadRequest().body("name missing");
    }
    let (ok, location) = state.file_service.put(&name, body.to_vec()).await;
    if ok {
        HttpResponse::Created().body(format!("stored on node {location}"))
    } else {
        HttpResponse::InternalServerError().body(format!("forward failed: {location}"))
    }
}

#[get("/files/{name}")]
async fn download_file(name: web::Path<String>, state: web::Data<AppState>) -> impl Responder {
    let name = name.into_inner();
    match state.file_service.get(&name).await {
        Some(content) => {
            let content_type = mime_guess::from_path(&name).first_or_octet_stream();
            HttpResponse::Ok()
                .content_type(content_type.as_ref())
                .insert_header(("Content-Disposition", format!("attachment; filename=\"{name}\"")))
                .body(content)
        }
        None => HttpResponse::NotFound().body("file not found"),
    }
}

#[delete("/files/{name}")]
async fn delete_file(name: web::Path<String>, state: web::Data<AppState>) -> impl Responder {
    let name = name.into_inner();
    if state.file_service.delete(&name).await {
        HttpResponse::Ok().body("deleted")
    } else {
        HttpResponse::NotFound().body("file not found")
    }
}

#[get("/files")]
async fn list_files(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.file_service.list_local().await)
}

/// Unconditional local save for forwarded PUTs. Stores regardless of
/// current ownership — the next stabilize + lookup repairs routing if
/// ownership has shifted in the meantime.
#[put("/files/forward/{name}")]
async fn forward_file(name: web::Path<String>, body: web::Bytes, state: web::Data<AppState>) -> impl Responder {
    let name = name.into_inner();
    match state.file_service.store_local(&name, body.to_vec()).await {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(e) => HttpResponse::InternalServerError().body(e),
    }
}

#[derive(Serialize)]
struct InfoResponse {
    id: u64,
    host: String,
    port: u16,
    successor_id: u64,
    successor_host: String,
    successor_port: u16,
    predecessor_id: Option<u64>,
    predecessor_host: Option<String>,
    predecessor_port: Option<u16>,
    finger_table: Vec<u64>,
}

#[get("/info")]
async fn get_info(state: web::Data<AppState>) -> impl Responder {
    let snapshot = state.ring.info().await;
    HttpResponse::Ok().json(InfoResponse {
        id: snapshot.identity.id,
        host: snapshot.identity.addr.host.clone(),
        port: snapshot.identity.addr.port,
        successor_id: snapshot.successor.id,
        successor_host: snapshot.successor.addr.host.clone(),
        successor_port: snapshot.successor.addr.port,
        predecessor_id: snapshot.predecessor.as_ref().map(|p| p.id),
        predecessor_host: snapshot.predecessor.as_ref().map(|p| p.addr.host.clone()),
        predecessor_port: snapshot.predecessor.as_ref().map(|p| p.addr.port),
        finger_table: snapshot.finger_ids,
    })
}

// --- Peer surface: /chord ----------------------------------------------------

#[post("/chord/join")]
async fn chord_join(body: web::Json<JoinRequest>, state: web::Data<AppState>) -> impl Responder {
    let req = body.into_inner();
    let joining = Identity { id: req.id, addr: NodeAddr::new(req.host, req.port) };
    match state.ring.handle_join(joining, req.hops).await {
        Ok(successor) => HttpResponse::Ok().json(successor),
        Err(e) => {
            warn!(error = %e, "join handling failed");
            HttpResponse::BadGateway().body(e.to_string())
        }
    }
}

#[post("/chord/successor")]
async fn chord_find_successor(body: web::Json<FindSuccessorRequest>, state: web::Data<AppState>) -> impl Responder {
    let req = body.into_inner();
    match state.ring.handle_find_successor(req.id, &req.requester, req.hops).await {
        Ok(successor) => HttpResponse::Ok().json(successor),
        Err(e) => {
            warn!(error = %e, "find_successor handling failed");
            HttpResponse::BadGateway().body(e.to_string())
        }
    }
}

#[post("/chord/notify")]
async fn chord_notify(body: web::Json<NotifyRequest>, state: web::Data<AppState>) -> impl Responder {
    state.ring.handle_notify(body.into_inner().candidate).await;
    HttpResponse::Ok().finish()
}

#[get("/chord/predecessor")]
async fn chord_predecessor(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(PredecessorResponse { predecessor: state.ring.get_predecessor().await })
}

#[post("/chord/leave")]
async fn chord_leave(body: web::Json<LeaveRequest>, state: web::Data<AppState>) -> impl Responder {
    let req = body.into_inner();
    state.ring.handle_leave(&req.departing, req.predecessor, req.successor).await;
    HttpResponse::Ok().finish()
}

#[post("/chord/keepalive")]
async fn chord_keepalive() -> impl Responder {
    HttpResponse::Ok().body("alive")
}

#[derive(Deserialize)]
struct NodeInfoQuery {}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(upload_file)
        .service(download_file)
        .service(delete_file)
        .service(list_files)
        .service(forward_file)
        .service(get_info)
        .service(chord_join)
        .service(chord_find_successor)
        .service(chord_notify)
        .service(chord_predecessor)
        .service(chord_leave)
        .service(chord_keepalive);
    let _ = NodeInfoQuery {};
}
