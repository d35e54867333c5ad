// src/handlers/pages.rs

use axum::{Json, response::IntoResponse};
use serde_json::json;

use crate::{
    error::dashboard_path,
    services::predictor::MODEL_FEATURES,
    utils::jwt::Identity,
};

/// Landing document. Signed-in callers are pointed at their dashboard.
pub async fn home(identity: Identity) -> impl IntoResponse {
    match identity.0 {
        Some(user) => {
            let redirect = dashboard_path(user.is_staff);
            Json(json!({ "user": user, "redirect": redirect }))
        }
        None => Json(json!({
            "title": "Student Performance Predictor",
            "links": {
                "predict": "/api/predict",
                "register": "/api/auth/register",
                "login": "/api/auth/login",
                "about": "/api/pages/about",
            },
        })),
    }
}

pub async fn about() -> impl IntoResponse {
    Json(json!({
        "title": "About",
        "body": "Predicts whether a student is likely to pass from academic and family \
                 background, and offers timed practice exams.",
    }))
}

pub async fn how_it_works() -> impl IntoResponse {
    Json(json!({
        "title": "How it works",
        "steps": [
            "Fill in the student's details and first two period grades.",
            "The model scores the attributes and returns PASS or FAIL with a confidence.",
            "Every prediction is saved to your history and dashboard analytics.",
        ],
    }))
}

pub async fn model_details() -> impl IntoResponse {
    Json(json!({
        "title": "Model details",
        "model": "logistic regression",
        "features": MODEL_FEATURES,
        "labels": ["PASS", "FAIL"],
    }))
}
