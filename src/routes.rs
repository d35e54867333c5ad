// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, contact, exam, pages, prediction, profile},
    state::AppState,
    store::session::session_middleware,
    utils::jwt::{identity_middleware, require_auth, require_staff},
};

/// Assembles the main application router.
///
/// * Public pages, contact form, predictions and account routes.
/// * Student and exam routes behind `require_auth`.
/// * Staff routes behind `require_staff`.
/// * Global middleware: trace, CORS, session cookie, caller identity.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    let public_routes = Router::new()
        .route("/pages/about", get(pages::about))
        .route("/pages/how-it-works", get(pages::how_it_works))
        .route("/pages/model-details", get(pages::model_details))
        .route(
            "/contact",
            get(contact::contact_form).post(contact::submit_contact),
        )
        .route(
            "/predict",
            get(prediction::predict_form).post(prediction::create_prediction),
        )
        .route("/predictions/latest", get(prediction::latest_prediction))
        .route("/predictions/{id}", get(prediction::get_prediction))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let student_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/student/dashboard", get(profile::dashboard))
        .route("/student/history", get(profile::history))
        .route("/student/profile", get(profile::get_profile))
        .route("/student/analytics", get(profile::analytics))
        .route("/exam/instructions", get(exam::instructions))
        .route("/exam/select", post(exam::select_subject))
        .route("/exam", get(exam::exam_page).post(exam::submit_exam))
        .route("/exam/start", post(exam::start_exam))
        .route("/exam/result", get(exam::last_result))
        .route("/exam/result/{id}", get(exam::get_result))
        .route("/exam/history", get(exam::history))
        .route_layer(middleware::from_fn(require_auth));

    let staff_routes = Router::new()
        .route("/staff/dashboard", get(admin::dashboard))
        .route("/staff/records", get(admin::list_records))
        .route(
            "/staff/users",
            get(admin::list_users).post(admin::manage_user),
        )
        .route(
            "/staff/subjects",
            get(admin::list_subjects).post(admin::create_subject),
        )
        .route("/staff/subjects/{id}", put(admin::update_subject))
        .route(
            "/staff/subjects/{id}/questions",
            get(admin::list_questions).post(admin::create_question),
        )
        .route("/staff/questions/{id}", put(admin::update_question))
        .route_layer(middleware::from_fn(require_staff));

    let api = public_routes.merge(student_routes).merge(staff_routes);

    Router::new()
        .route("/api", get(pages::home))
        .nest("/api", api)
        // Global Middleware (outermost first)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    session_middleware,
                ))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    identity_middleware,
                )),
        )
        .with_state(state)
}
