//! Caller identity as forwarded by the upstream gateway.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use crate::domain::monsters::{Actor, ActorRole};

use super::error::ApiError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Extractor that rejects requests without an actor id with 401.
#[derive(Debug, Clone)]
pub struct RequireActor(pub Actor);

impl<S> FromRequestParts<S> for RequireActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers)
            .map(RequireActor)
            .ok_or_else(|| ApiError::unauthorized().with_source("infra::http::api::actor"))
    }
}

/// A missing role header reads as the unprivileged role.
pub fn actor_from_headers(headers: &HeaderMap) -> Option<Actor> {
    let id = header_str(headers, ACTOR_ID_HEADER)?;
    let role = header_str(headers, ACTOR_ROLE_HEADER)
        .map(ActorRole::parse)
        .unwrap_or(ActorRole::Member);
    Some(Actor::new(id, role))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
