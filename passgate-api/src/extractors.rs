/// Request extractors
///
/// - [`ApiJson`]: `axum::Json` whose rejections become `400` [`ApiError`]s
/// - [`read_register_form`] / [`read_avatar_form`]: multipart bodies of the
///   registration and avatar endpoints; uploaded files are staged through
///   [`AvatarStorage`] while the body is read

use axum::extract::{FromRequest, Multipart};
use passgate_shared::{
    accounts::RegisterInput,
    avatar::{AvatarStorage, StagedUpload},
    models::user::Subscription,
};

use crate::error::{ApiError, ApiResult, ValidationErrorDetail};

/// Multipart field carrying the avatar file
pub const AVATAR_FIELD: &str = "avatar";

/// JSON body extractor with API error rejections
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Parsed registration form
#[derive(Debug)]
pub struct RegisterForm {
    pub input: RegisterInput,
    pub avatar: Option<StagedUpload>,
}

fn required(field: &str, message: &str) -> ApiError {
    ApiError::ValidationError(vec![ValidationErrorDetail {
        field: field.to_string(),
        message: message.to_string(),
    }])
}

fn parse_subscription(value: String) -> ApiResult<Option<Subscription>> {
    if value.trim().is_empty() {
        return Ok(None);
    }

    Subscription::try_from(value.trim().to_string())
        .map(Some)
        .map_err(|_| required("subscription", "Subscription must be one of starter, pro, business"))
}

/// Stages an upload, discarding any file staged earlier for the same field
async fn stage_field(
    avatars: &AvatarStorage,
    slot: &mut Option<StagedUpload>,
    field: axum::extract::multipart::Field<'_>,
) -> ApiResult<()> {
    let content_type = field.content_type().map(str::to_string);
    let data = field.bytes().await?;
    let staged = avatars.stage(content_type.as_deref(), data).await?;

    if let Some(previous) = slot.replace(staged) {
        avatars.discard(previous).await;
    }
    Ok(())
}

/// Reads `email`, `password`, optional `subscription` and optional `avatar`
///
/// On any error the staged avatar, if any, is discarded before returning.
pub async fn read_register_form(mut multipart: Multipart, avatars: &AvatarStorage) -> ApiResult<RegisterForm> {
    let mut email = None;
    let mut password = None;
    let mut subscription = None;
    let mut avatar = None;

    let read: ApiResult<()> = async {
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();

            match name.as_str() {
                "email" => email = Some(field.text().await?),
                "password" => password = Some(field.text().await?),
                "subscription" => subscription = parse_subscription(field.text().await?)?,
                AVATAR_FIELD => stage_field(avatars, &mut avatar, field).await?,
                _ => {}
            }
        }

        if email.is_none() {
            return Err(required("email", "Email is required"));
        }
        if password.is_none() {
            return Err(required("password", "Password is required"));
        }
        Ok::<(), ApiError>(())
    }
    .await;

    match (read, email, password) {
        (Ok(()), Some(email), Some(password)) => Ok(RegisterForm {
            input: RegisterInput {
                email,
                password,
                subscription,
            },
            avatar,
        }),
        (result, _, _) => {
            if let Some(staged) = avatar {
                avatars.discard(staged).await;
            }
            Err(result.err().unwrap_or_else(|| required("email", "Email is required")))
        }
    }
}

/// Reads the single `avatar` file of an avatar update
pub async fn read_avatar_form(mut multipart: Multipart, avatars: &AvatarStorage) -> ApiResult<StagedUpload> {
    let mut avatar = None;

    let read: ApiResult<()> = async {
        while let Some(field) = multipart.next_field().await? {
            let is_avatar = field.name() == Some(AVATAR_FIELD);
            if is_avatar {
                stage_field(avatars, &mut avatar, field).await?;
            }
        }
        Ok::<(), ApiError>(())
    }
    .await;

    match (read, avatar) {
        (Ok(()), Some(staged)) => Ok(staged),
        (Ok(()), None) => Err(required(AVATAR_FIELD, "Avatar file is required")),
        (Err(e), staged) => {
            if let Some(staged) = staged {
                avatars.discard(staged).await;
            }
            Err(e)
        }
    }
}
