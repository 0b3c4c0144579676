// handlers/extract.rs - Request extractors whose rejections answer with the ApiError envelope

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::ApiError;

/// JSON request body
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct Json<T>(pub T);

/// Typed path parameters
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct Path<T>(pub T);

/// Typed query string
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct Query<T>(pub T);
