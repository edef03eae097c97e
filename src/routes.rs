use log::debug;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{HttpRequest, HttpResponse, guard, http::Method, web};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::gpio::{Direction, GpioGateway, PinController};
use crate::profiles::{JsonProfileStore, Profile};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct AppState<G: GpioGateway> {
    pub controller: Arc<PinController<G>>,
    pub profiles: Option<Arc<JsonProfileStore>>,
    pub timeout: Duration,
}

impl<G: GpioGateway> Clone for AppState<G> {
    fn clone(&self) -> Self {
        Self {
            controller: Arc::clone(&self.controller),
            profiles: self.profiles.clone(),
            timeout: self.timeout,
        }
    }
}

#[derive(Deserialize)]
struct ExportPayload {
    pin: Option<i64>,
    direction: Option<String>,
}

#[derive(Deserialize)]
struct ValuePayload {
    value: Option<i64>,
}

#[derive(Serialize)]
struct PinDirectionEntry {
    pin: u32,
    direction: Direction,
}

#[derive(Serialize)]
struct PinValueEntry {
    pin: i64,
    value: u8,
}

#[derive(Serialize)]
struct ApplyResult {
    profile: String,
    exported: usize,
}

impl<G: GpioGateway + 'static> AppState<G> {
    pub fn new(controller: Arc<PinController<G>>) -> Self {
        Self {
            controller,
            profiles: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_profiles(mut self, store: Arc<JsonProfileStore>) -> Self {
        self.profiles = Some(store);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn api_scope(&self, base_path: &str) -> actix_web::Scope {
        web::scope(base_path)
            .service(
                web::resource("/gpio")
                    .route(web::get().to(list_pins::<G>))
                    .route(web::post().to(export_pin::<G>))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET, Method::POST]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/gpio/{pin_id}")
                    .route(web::get().to(get_value::<G>))
                    .route(web::patch().to(set_value::<G>))
                    .route(web::delete().to(unexport_pin::<G>))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[
                                Method::GET,
                                Method::PATCH,
                                Method::DELETE,
                            ]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/gpio/{pin_id}/status")
                    .route(web::get().to(pin_status::<G>))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/profiles/{name}")
                    .route(web::get().to(get_profile::<G>))
                    .route(web::put().to(put_profile::<G>))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::GET, Method::PUT]))
                            .to(method_not_allowed),
                    ),
            )
            .service(
                web::resource("/profiles/{name}/apply")
                    .route(web::post().to(apply_profile::<G>))
                    .route(
                        web::route()
                            .guard(guard_not_methods(&[Method::POST]))
                            .to(method_not_allowed),
                    ),
            )
    }

    fn profile_store(&self) -> Result<Arc<JsonProfileStore>, AppError> {
        self.profiles
            .clone()
            .ok_or_else(|| AppError::Profile("profile storage not configured".into()))
    }
}

/// Runs blocking GPIO or file work off the async workers, bounded by `timeout`.
async fn run_blocking<T, F>(timeout: Duration, f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
{
    match tokio::time::timeout(timeout, web::block(f)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(AppError::Internal(format!("blocking task failed: {e}"))),
        Err(_) => Err(AppError::Timeout(timeout)),
    }
}

async fn list_pins<G: GpioGateway + 'static>(
    state: web::Data<AppState<G>>,
) -> Result<HttpResponse, AppError> {
    let controller = Arc::clone(&state.controller);
    let pins = run_blocking(state.timeout, move || Ok(controller.list_exported_pins()?)).await?;

    if pins.is_empty() {
        return Ok(HttpResponse::NoContent().finish());
    }

    let entries: Vec<PinDirectionEntry> = pins
        .into_iter()
        .map(|(pin, direction)| PinDirectionEntry { pin, direction })
        .collect();
    Ok(HttpResponse::Ok().json(entries))
}

async fn export_pin<G: GpioGateway + 'static>(
    body: web::Bytes,
    state: web::Data<AppState<G>>,
) -> Result<HttpResponse, AppError> {
    let payload: ExportPayload = parse_json(&body)?;
    let (Some(pin), Some(direction)) = (payload.pin, payload.direction) else {
        return Err(AppError::InvalidRequest(
            "both 'pin' and 'direction' are required".into(),
        ));
    };
    let direction = Direction::parse(&direction);
    debug!("export request for pin {pin} as {direction}");

    let controller = Arc::clone(&state.controller);
    run_blocking(state.timeout, move || Ok(controller.export_pin(pin, direction)?)).await?;

    Ok(HttpResponse::Ok().finish())
}

async fn unexport_pin<G: GpioGateway + 'static>(
    req: HttpRequest,
    state: web::Data<AppState<G>>,
) -> Result<HttpResponse, AppError> {
    let pin = parse_pin_id(&req)?;

    let controller = Arc::clone(&state.controller);
    run_blocking(state.timeout, move || Ok(controller.unexport_pin(pin)?)).await?;

    Ok(HttpResponse::Ok().finish())
}

async fn get_value<G: GpioGateway + 'static>(
    req: HttpRequest,
    state: web::Data<AppState<G>>,
) -> Result<HttpResponse, AppError> {
    let pin = parse_pin_id(&req)?;

    let controller = Arc::clone(&state.controller);
    let value = run_blocking(state.timeout, move || Ok(controller.get_value(pin)?)).await?;

    Ok(HttpResponse::Ok().json(PinValueEntry { pin, value }))
}

async fn set_value<G: GpioGateway + 'static>(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState<G>>,
) -> Result<HttpResponse, AppError> {
    let pin = parse_pin_id(&req)?;
    let payload: ValuePayload = parse_json(&body)?;
    let value = payload
        .value
        .ok_or_else(|| AppError::InvalidRequest("'value' is required".into()))?;

    let controller = Arc::clone(&state.controller);
    run_blocking(state.timeout, move || Ok(controller.set_value(pin, value)?)).await?;

    Ok(HttpResponse::Ok().finish())
}

async fn pin_status<G: GpioGateway + 'static>(
    req: HttpRequest,
    state: web::Data<AppState<G>>,
) -> Result<HttpResponse, AppError> {
    let pin = parse_pin_id(&req)?;

    let controller = Arc::clone(&state.controller);
    let status = run_blocking(state.timeout, move || Ok(controller.pin_status(pin)?)).await?;

    Ok(HttpResponse::Ok().json(status))
}

async fn get_profile<G: GpioGateway + 'static>(
    name: web::Path<String>,
    state: web::Data<AppState<G>>,
) -> Result<HttpResponse, AppError> {
    let store = state.profile_store()?;
    let name = name.into_inner();

    let profile = run_blocking(state.timeout, move || store.load(&name)).await?;

    Ok(HttpResponse::Ok().json(profile))
}

async fn put_profile<G: GpioGateway + 'static>(
    name: web::Path<String>,
    body: web::Bytes,
    state: web::Data<AppState<G>>,
) -> Result<HttpResponse, AppError> {
    let store = state.profile_store()?;
    let name = name.into_inner();
    let profile: Profile = parse_json(&body)?;
    if profile.name != name {
        return Err(AppError::InvalidRequest(format!(
            "profile name '{}' does not match path '{name}'",
            profile.name
        )));
    }

    let saved = profile.clone();
    run_blocking(state.timeout, move || store.save(&saved)).await?;

    Ok(HttpResponse::Ok().json(profile))
}

async fn apply_profile<G: GpioGateway + 'static>(
    name: web::Path<String>,
    state: web::Data<AppState<G>>,
) -> Result<HttpResponse, AppError> {
    let store = state.profile_store()?;
    let controller = Arc::clone(&state.controller);
    let name = name.into_inner();

    let profile = name.clone();
    let exported = run_blocking(state.timeout, move || {
        store.load(&profile)?.apply(&*controller)
    })
    .await?;

    Ok(HttpResponse::Ok().json(ApplyResult {
        profile: name,
        exported,
    }))
}

fn parse_json<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T, AppError> {
    if body.is_empty() {
        return Err(AppError::InvalidRequest("Empty request body".into()));
    }

    serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidRequest(format!("Invalid request body: {e}")))
}

fn parse_pin_id(req: &HttpRequest) -> Result<i64, AppError> {
    let pin_id = req
        .match_info()
        .get("pin_id")
        .ok_or_else(|| AppError::InvalidRequest("Missing pin id".into()))?;
    let pin_id = pin_id
        .parse::<i64>()
        .map_err(|_| AppError::InvalidRequest("Invalid pin id".into()))?;

    Ok(pin_id)
}

async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().finish()
}

fn guard_not_methods(methods: &[Method]) -> impl guard::Guard {
    let allowed: Vec<Method> = methods.to_vec();
    guard::fn_guard(move |ctx| !allowed.iter().any(|m| m == ctx.head().method))
}
