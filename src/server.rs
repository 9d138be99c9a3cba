use std::{collections::HashMap, path::PathBuf, sync::Arc};

use actix_files::NamedFile;
use actix_web::{
    App, HttpRequest, HttpResponse, HttpServer, Responder, delete, get, http::header, post, put,
    web,
};
use anyhow::Result;
use futures_util::StreamExt;
use log::info;
use serde::Deserialize;
use serde_json::json;

use crate::entity::device::DeviceRecord;
use crate::error::InventoryError;
use crate::multipart::{self, PartValue};
use crate::photos::{PhotoStore, PhotoStoreImpl};
use crate::store::{InventoryStore, new_inventory_store};

#[derive(Clone)]
struct AppState {
    store: Arc<dyn InventoryStore>,
}

/// Buffer the whole request body. The multipart parser operates on the
/// complete byte sequence, never on partial chunks.
async fn read_body(payload: &mut web::Payload) -> Result<web::BytesMut, InventoryError> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk =
            chunk.map_err(|e| InventoryError::validation(format!("malformed body: {e}")))?;
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Validate the content type and decode the multipart fields. The parser
/// itself never fails; missing type or boundary is rejected here.
fn form_fields(
    req: &HttpRequest,
    body: &[u8],
) -> Result<HashMap<String, PartValue>, InventoryError> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !multipart::is_form_data(content_type) {
        return Err(InventoryError::validation(
            "Content-Type must be multipart/form-data",
        ));
    }
    let boundary = multipart::boundary_from_content_type(content_type)
        .ok_or_else(|| InventoryError::validation("multipart boundary missing"))?;
    Ok(multipart::parse_form_data(body, &boundary))
}

fn full_view(record: &DeviceRecord) -> serde_json::Value {
    json!({
        "id": record.id,
        "inventory_name": record.inventory_name,
        "description": record.description,
        "photo_filename": record.photo_filename,
        "created_at": record.created_at,
        "photo_url": record.photo_url(),
    })
}

#[post("/register")]
async fn register(
    req: HttpRequest,
    mut payload: web::Payload,
    data: web::Data<AppState>,
) -> Result<HttpResponse, InventoryError> {
    let body = read_body(&mut payload).await?;
    let fields = form_fields(&req, &body)?;
    let name = fields
        .get("inventory_name")
        .and_then(|v| v.as_text())
        .unwrap_or("");
    let description = fields
        .get("description")
        .and_then(|v| v.as_text())
        .unwrap_or("");
    let photo = fields.get("photo").and_then(|v| v.as_file());
    let record = data.store.create(name, description, photo).await?;
    Ok(HttpResponse::Created().json(json!({ "message": "Device registered", "id": record.id })))
}

#[get("/inventory")]
async fn list_inventory(data: web::Data<AppState>) -> impl Responder {
    let items: Vec<serde_json::Value> = data
        .store
        .list()
        .await
        .iter()
        .map(|record| {
            json!({
                "id": record.id,
                "inventory_name": record.inventory_name,
                "description": record.description,
                "created_at": record.created_at,
                "photo_url": record.photo_url(),
            })
        })
        .collect();
    HttpResponse::Ok().json(items)
}

#[get("/inventory/{id}")]
async fn get_device(
    path: web::Path<u64>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, InventoryError> {
    let record = data.store.get(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(full_view(&record)))
}

#[derive(Debug, Deserialize)]
struct UpdateDevicePayload {
    inventory_name: Option<String>,
    description: Option<String>,
}

#[put("/inventory/{id}")]
async fn update_device(
    path: web::Path<u64>,
    payload: web::Json<UpdateDevicePayload>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, InventoryError> {
    let record = data
        .store
        .update(
            path.into_inner(),
            payload.inventory_name.as_deref(),
            payload.description.as_deref(),
        )
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Updated", "item": record })))
}

#[delete("/inventory/{id}")]
async fn delete_device(
    path: web::Path<u64>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, InventoryError> {
    data.store.delete(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Deleted" })))
}

#[get("/inventory/{id}/photo")]
async fn get_photo(
    path: web::Path<u64>,
    data: web::Data<AppState>,
) -> Result<NamedFile, InventoryError> {
    let photo_path = data.store.photo_path(path.into_inner()).await?;
    let file = NamedFile::open_async(&photo_path)
        .await
        .map_err(|e| InventoryError::Storage(anyhow::anyhow!("open {photo_path:?}: {e}")))?;
    Ok(file.set_content_type(mime::IMAGE_JPEG))
}

#[put("/inventory/{id}/photo")]
async fn put_photo(
    req: HttpRequest,
    path: web::Path<u64>,
    mut payload: web::Payload,
    data: web::Data<AppState>,
) -> Result<HttpResponse, InventoryError> {
    let id = path.into_inner();
    let body = read_body(&mut payload).await?;
    let fields = form_fields(&req, &body)?;
    // an unknown id wins over a missing file part
    data.store.get(id).await?;
    let photo = fields
        .get("photo")
        .and_then(|v| v.as_file())
        .ok_or_else(|| InventoryError::validation("No file uploaded"))?;
    data.store.update_photo(id, photo).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Photo updated" })))
}

#[derive(Debug, Deserialize)]
struct SearchForm {
    id: Option<String>,
    has_photo: Option<String>,
}

#[post("/search")]
async fn search(
    form: web::Form<SearchForm>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, InventoryError> {
    // an unparsable id cannot match any record
    let id = form
        .id
        .as_deref()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .ok_or(InventoryError::NotFound)?;
    let mut record = data.store.get(id).await?;
    let wants_photo = matches!(form.has_photo.as_deref(), Some("true") | Some("on"));
    if wants_photo && record.photo_filename.is_some() {
        record
            .description
            .push_str(&format!(" (Photo link: /inventory/{id}/photo)"));
    }
    Ok(HttpResponse::Ok().json(record))
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub photos_dir: PathBuf,
}

pub async fn run(config: ServerConfig) -> Result<()> {
    let photos = Arc::new(PhotoStoreImpl::new(config.photos_dir.clone())) as Arc<dyn PhotoStore>;
    let state = AppState {
        store: Arc::new(new_inventory_store(photos)) as Arc<dyn InventoryStore>,
    };
    let bind_addr = format!("{}:{}", config.host, config.port);
    info!("Starting inventory server at http://{}", &bind_addr);
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .service(register)
            .service(list_inventory)
            .service(get_device)
            .service(update_device)
            .service(delete_device)
            .service(get_photo)
            .service(put_photo)
            .service(search)
    })
    .bind(&bind_addr)?
    .run()
    .await?;
    Ok(())
}
