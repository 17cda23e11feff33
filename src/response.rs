use actix_web::HttpResponse;
use serde::Serialize;

use crate::pagination::{Page, PageMeta};

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<PageMeta>,
}

pub fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(Envelope {
        success: true,
        data,
        message: None,
        meta: None,
    })
}

pub fn ok_with_message<T: Serialize>(data: T, message: &str) -> HttpResponse {
    HttpResponse::Ok().json(Envelope {
        success: true,
        data,
        message: Some(message.to_string()),
        meta: None,
    })
}

pub fn created<T: Serialize>(data: T, message: &str) -> HttpResponse {
    HttpResponse::Created().json(Envelope {
        success: true,
        data,
        message: Some(message.to_string()),
        meta: None,
    })
}

pub fn page<T: Serialize>(page: Page<T>) -> HttpResponse {
    HttpResponse::Ok().json(Envelope {
        success: true,
        data: page.items,
        message: None,
        meta: Some(page.meta),
    })
}
