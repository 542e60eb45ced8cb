//! Monster catalog handlers.

use std::path::Path as FsPath;

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum_extra::extract::Query;

use crate::application::monsters::{
    CreateMonsterCommand, MonsterImageUpload, UpdateMonsterCommand,
};
use crate::domain::monsters::MonsterPatch;

use super::actor::RequireActor;
use super::error::{ApiError, catalog_to_api, codes};
use super::models::{CapturedRequest, MonsterListParams, SuccessResponse};
use super::state::ApiState;

const SOURCE: &str = "infra::http::api::monsters";
const IMAGE_FIELD: &str = "image";
const TYPE_FIELD: &str = "type_id";
const IMAGE_EXTENSIONS: [&str; 3] = ["jpeg", "jpg", "png"];

pub async fn list_monsters(
    State(state): State<ApiState>,
    Query(params): Query<MonsterListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let monsters = state
        .catalog
        .list_monsters(params.into())
        .await
        .map_err(|err| catalog_to_api(SOURCE, err))?;
    Ok(Json(monsters))
}

pub async fn get_monster(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let monster = state
        .catalog
        .find_monster(&id)
        .await
        .map_err(|err| catalog_to_api(SOURCE, err))?;
    Ok(Json(monster))
}

pub async fn create_monster(
    State(state): State<ApiState>,
    RequireActor(actor): RequireActor,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = read_monster_form(multipart, state.max_image_bytes).await?;
    let fields = form
        .patch
        .into_new_fields()
        .map_err(|err| catalog_to_api(SOURCE, err.into()))?;
    let image = form
        .image
        .ok_or_else(|| ApiError::invalid_input("image is required").with_source(SOURCE))?;

    let command = CreateMonsterCommand {
        name: fields.name,
        category_id: fields.category_id,
        description: fields.description,
        length: fields.length,
        weight: fields.weight,
        hp: fields.hp,
        attack: fields.attack,
        defends: fields.defends,
        speed: fields.speed,
        type_ids: form.type_ids,
        image,
    };

    let record = state
        .monsters
        .create(&actor, command)
        .await
        .map_err(|err| catalog_to_api(SOURCE, err))?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn update_monster(
    State(state): State<ApiState>,
    RequireActor(actor): RequireActor,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = read_monster_form(multipart, state.max_image_bytes).await?;
    let command = UpdateMonsterCommand {
        patch: form.patch,
        type_ids: form.type_ids,
        image: form.image,
    };

    let record = state
        .monsters
        .update(&actor, &id, command)
        .await
        .map_err(|err| catalog_to_api(SOURCE, err))?;
    Ok(Json(record))
}

pub async fn mark_captured(
    State(state): State<ApiState>,
    RequireActor(actor): RequireActor,
    Path(id): Path<String>,
    Json(payload): Json<CapturedRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let success = state
        .monsters
        .mark_captured(&actor, &id, payload.captured)
        .await
        .map_err(|err| catalog_to_api(SOURCE, err))?;
    Ok(Json(SuccessResponse { success }))
}

pub async fn delete_monster(
    State(state): State<ApiState>,
    RequireActor(actor): RequireActor,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let success = state
        .monsters
        .delete(&actor, &id)
        .await
        .map_err(|err| catalog_to_api(SOURCE, err))?;
    Ok(Json(SuccessResponse { success }))
}

pub async fn list_categories(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let categories = state
        .catalog
        .list_categories()
        .await
        .map_err(|err| catalog_to_api(SOURCE, err))?;
    Ok(Json(categories))
}

pub async fn list_types(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let types = state
        .catalog
        .list_types()
        .await
        .map_err(|err| catalog_to_api(SOURCE, err))?;
    Ok(Json(types))
}

#[derive(Debug, Default)]
struct MonsterForm {
    patch: MonsterPatch,
    type_ids: Vec<String>,
    image: Option<MonsterImageUpload>,
}

async fn read_monster_form(
    mut multipart: Multipart,
    max_image_bytes: usize,
) -> Result<MonsterForm, ApiError> {
    let mut form = MonsterForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_to_api)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == IMAGE_FIELD {
            let filename = field
                .file_name()
                .map(str::to_string)
                .unwrap_or_default();
            let content_type = field
                .content_type()
                .map(str::to_string)
                .unwrap_or_default();
            let data = field.bytes().await.map_err(multipart_to_api)?;
            let upload = MonsterImageUpload {
                filename,
                content_type,
                data,
            };
            validate_image(&upload, max_image_bytes)?;
            form.image = Some(upload);
            continue;
        }

        let value = field.text().await.map_err(multipart_to_api)?;
        if name == TYPE_FIELD {
            form.type_ids.push(value);
            continue;
        }

        let patch = &mut form.patch;
        let slot = match name.as_str() {
            "name" => &mut patch.name,
            "category_id" => &mut patch.category_id,
            "description" => &mut patch.description,
            "length" => &mut patch.length,
            "weight" => &mut patch.weight,
            "hp" => &mut patch.hp,
            "attack" => &mut patch.attack,
            "defends" => &mut patch.defends,
            "speed" => &mut patch.speed,
            "captured" => &mut patch.captured,
            _ => continue,
        };
        *slot = Some(value);
    }

    Ok(form)
}

fn validate_image(upload: &MonsterImageUpload, max_image_bytes: usize) -> Result<(), ApiError> {
    let extension = FsPath::new(&upload.filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let allowed = extension
        .as_deref()
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext));
    if !allowed {
        return Err(ApiError::invalid_input(format!(
            "image must be one of {}",
            IMAGE_EXTENSIONS.join(", ")
        ))
        .with_source(SOURCE));
    }
    if upload.data.is_empty() {
        return Err(ApiError::invalid_input("image is empty").with_source(SOURCE));
    }
    if upload.data.len() > max_image_bytes {
        return Err(ApiError::payload_too_large(max_image_bytes).with_source(SOURCE));
    }
    Ok(())
}

fn multipart_to_api(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            codes::PAYLOAD_TOO_LARGE,
            "Request body too large",
            Some(err.body_text()),
        )
        .with_source(SOURCE);
    }
    ApiError::bad_request("invalid multipart payload", Some(err.body_text())).with_source(SOURCE)
}
