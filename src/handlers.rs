//! `/messages` resource: JSON in, JSON out, one store call per request.

use std::sync::Arc;

use actix_web::error::JsonPayloadError;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::message_database::{Message, MessagePatch, MessageStore, NewMessage, StoreResult};

pub type StoreData = web::Data<dyn MessageStore>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTdo {
    pub id: i32,
    pub body: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<Message> for MessageTdo {
    fn from(msg: Message) -> Self {
        MessageTdo {
            id: msg.id,
            body: msg.body,
            username: msg.username,
            created_at: msg.created_at,
            updated_at: msg.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NewMessageTdo {
    pub body: String,
    pub username: String,
}

impl NewMessageTdo {
    fn validate(self) -> Result<NewMessage, ApiError> {
        require("body", &self.body)?;
        require("username", &self.username)?;
        Ok(NewMessage {
            body: self.body,
            username: self.username,
        })
    }
}

/// Only `body` may change after posting.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessagePatchTdo {
    #[serde(default)]
    pub body: Option<String>,
}

impl MessagePatchTdo {
    fn validate(self) -> Result<MessagePatch, ApiError> {
        if let Some(body) = &self.body {
            require("body", body)?;
        }
        Ok(MessagePatch { body: self.body })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedTdo {
    pub id: i32,
    pub deleted: bool,
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Runs a store call on the blocking pool and waits for it.
async fn with_store<T, F>(store: &StoreData, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&dyn MessageStore) -> StoreResult<T> + Send + 'static,
{
    let store: Arc<dyn MessageStore> = store.clone().into_inner();
    let result = web::block(move || op(store.as_ref())).await?;
    Ok(result?)
}

async fn get_messages(store: StoreData) -> Result<HttpResponse, ApiError> {
    let messages = with_store(&store, |store| store.list()).await?;
    let messages: Vec<MessageTdo> = messages.into_iter().map(MessageTdo::from).collect();
    Ok(HttpResponse::Ok().json(messages))
}

async fn get_message(id: web::Path<i32>, store: StoreData) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let msg = with_store(&store, move |store| store.get(id)).await?;
    Ok(HttpResponse::Ok().json(MessageTdo::from(msg)))
}

async fn post_message(
    form: web::Json<NewMessageTdo>,
    store: StoreData,
) -> Result<HttpResponse, ApiError> {
    let new = form.into_inner().validate()?;
    let msg = with_store(&store, move |store| store.create(new)).await?;

    info!(id = msg.id, username = %msg.username, "Got message");
    Ok(HttpResponse::Created().json(MessageTdo::from(msg)))
}

async fn patch_message(
    id: web::Path<i32>,
    form: web::Json<MessagePatchTdo>,
    store: StoreData,
) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    let patch = form.into_inner().validate()?;
    let msg = with_store(&store, move |store| store.update(id, patch)).await?;
    Ok(HttpResponse::Ok().json(MessageTdo::from(msg)))
}

async fn delete_message(id: web::Path<i32>, store: StoreData) -> Result<HttpResponse, ApiError> {
    let id = id.into_inner();
    with_store(&store, move |store| store.delete(id)).await?;

    info!(id, "Deleted message");
    Ok(HttpResponse::Ok().json(DeletedTdo { id, deleted: true }))
}

async fn method_not_allowed(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    Err(ApiError::MethodNotAllowed(format!(
        "{} is not allowed on {}",
        req.method(),
        req.path()
    )))
}

async fn no_route(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    Err(ApiError::NotFound(format!("no route for {}", req.path())))
}

fn json_error(err: JsonPayloadError) -> ApiError {
    match err {
        JsonPayloadError::Overflow { .. } | JsonPayloadError::OverflowKnownLength { .. } => {
            ApiError::PayloadTooLarge(err.to_string())
        }
        _ => ApiError::Validation(err.to_string()),
    }
}

/// Registers the message routes plus JSON error handling for bad bodies,
/// ids, methods and paths. The caller provides the store as
/// `web::Data<dyn MessageStore>`.
///
/// Registers a catch-all route, so call it after any other services.
pub fn configure(cfg: &mut web::ServiceConfig) {
    let json_config = web::JsonConfig::default().error_handler(|err, _req| json_error(err).into());
    let path_config = web::PathConfig::default()
        .error_handler(|err, _req| ApiError::NotFound(err.to_string()).into());

    cfg.app_data(json_config)
        .app_data(path_config)
        .service(
            web::resource("/messages")
                .route(web::get().to(get_messages))
                .route(web::post().to(post_message))
                .default_service(web::to(method_not_allowed)),
        )
        .service(
            web::resource("/messages/{id}")
                .route(web::get().to(get_message))
                .route(web::patch().to(patch_message))
                .route(web::delete().to(delete_message))
                .default_service(web::to(method_not_allowed)),
        )
        .service(web::resource("/{tail:.*}").to(no_route));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_message_requires_both_fields() {
        let ok = NewMessageTdo {
            body: String::from("Hello 👋"),
            username: String::from("Liza"),
        };
        assert_eq!(
            ok.validate().unwrap(),
            NewMessage {
                body: String::from("Hello 👋"),
                username: String::from("Liza"),
            }
        );

        let blank_user = NewMessageTdo {
            body: String::from("Hello"),
            username: String::from("  "),
        };
        assert!(matches!(
            blank_user.validate(),
            Err(ApiError::Validation(msg)) if msg == "username must not be empty"
        ));
    }

    #[test]
    fn patch_rejects_username() {
        let parsed: Result<MessagePatchTdo, _> =
            serde_json::from_str(r#"{"body": "x", "username": "Mallory"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn patch_without_body_is_empty() {
        let parsed: MessagePatchTdo = serde_json::from_str("{}").unwrap();
        assert!(parsed.validate().unwrap().is_empty());
    }

    #[test]
    fn oversized_json_is_413() {
        let err = json_error(JsonPayloadError::Overflow { limit: 2_097_152 });
        assert!(matches!(err, ApiError::PayloadTooLarge(_)));

        let err = json_error(JsonPayloadError::ContentType);
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn patch_with_blank_body_is_invalid() {
        let parsed: MessagePatchTdo = serde_json::from_str(r#"{"body": ""}"#).unwrap();
        assert!(matches!(parsed.validate(), Err(ApiError::Validation(_))));
    }
}
