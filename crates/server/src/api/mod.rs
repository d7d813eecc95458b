use shared::{
    domain::{FoodId, FoodSummary},
    error::{ApiError, ErrorCode},
    protocol::CreateFoodRequest,
};
use storage::Storage;
use tracing::info;

const MAX_NAME_CHARS: usize = 120;
const MAX_DESCRIPTION_CHARS: usize = 2000;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

pub async fn list_foods(ctx: &ApiContext) -> Result<Vec<FoodSummary>, ApiError> {
    ctx.storage.list_foods().await.map_err(internal)
}

pub async fn get_food(ctx: &ApiContext, food_id: FoodId) -> Result<FoodSummary, ApiError> {
    ctx.storage
        .food(food_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, format!("food {food_id} not found")))
}

/// Inserts a food, or refreshes its description when the name already exists.
pub async fn create_food(
    ctx: &ApiContext,
    req: CreateFoodRequest,
) -> Result<FoodSummary, ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "food name cannot be empty",
        ));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("food name exceeds {MAX_NAME_CHARS} characters"),
        ));
    }
    let description = req.description.as_deref().map(str::trim);
    if description.is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_CHARS) {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("description exceeds {MAX_DESCRIPTION_CHARS} characters"),
        ));
    }

    let food_id = ctx
        .storage
        .insert_food(name, description)
        .await
        .map_err(internal)?;
    info!(food_id = food_id.0, name, "api: food stored");
    get_food(ctx, food_id).await
}

fn internal(e: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, format!("{e:#}"))
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
