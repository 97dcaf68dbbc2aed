//! Service-identity gate as an Axum extractor.

use archibus_core::identity::ServiceIdentity;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::state::AppState;

/// The verified calling service.
///
/// Any handler taking this parameter rejects unidentified callers with 401
/// before its body runs, so no state is touched.
///
/// ```ignore
/// async fn publish(CallerIdentity(caller): CallerIdentity) -> AppResult<Json<()>> {
///     tracing::info!(caller = %caller, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CallerIdentity(pub ServiceIdentity);

impl FromRequestParts<AppState> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match state.identity.verify(&parts.headers) {
            Ok(identity) => Ok(CallerIdentity(identity)),
            Err(e) => {
                tracing::warn!(
                    method = %parts.method,
                    path = %parts.uri.path(),
                    error = %e,
                    "Rejected unidentified caller"
                );
                Err(AppError::Core(e))
            }
        }
    }
}
