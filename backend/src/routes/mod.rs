//! Route definitions for the CREAS case management API

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/me", get(handlers::me))
        .route("/auth/password", put(handlers::change_password))
        .nest("/users", user_routes())
        .nest("/cases", case_routes())
        .nest("/evolutions", evolution_routes())
        .nest("/family", family_routes())
        .nest("/referrals", referral_routes())
        .nest("/appointments", appointment_routes())
        .nest("/saved-filters", saved_filter_routes())
        .nest("/dashboard", dashboard_routes())
        .nest("/reports", report_routes())
        .route("/audit-logs", get(handlers::list_audit_logs))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Session bootstrap (public)
        .route("/auth/login", post(handlers::login))
        .route("/auth/refresh", post(handlers::refresh))
        .merge(protected)
}

fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_users).post(handlers::create_user))
        .route("/:id", get(handlers::get_user).put(handlers::update_user))
        .route("/:id/reset-password", post(handlers::reset_password))
}

/// Case routes, including the per-case sub-resources
fn case_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_cases).post(handlers::create_case))
        .route(
            "/:id",
            get(handlers::get_case)
                .put(handlers::update_case)
                .delete(handlers::delete_case),
        )
        .route("/:id/technician", put(handlers::assign_technician))
        .route("/:id/status", post(handlers::change_case_status))
        .route(
            "/:id/evolutions",
            get(handlers::list_evolutions).post(handlers::create_evolution),
        )
        .route(
            "/:id/family",
            get(handlers::get_family).post(handlers::add_family_member),
        )
        .route(
            "/:id/referrals",
            get(handlers::list_case_referrals).post(handlers::create_referral),
        )
        .route(
            "/:id/action-plan",
            get(handlers::get_action_plan).put(handlers::save_action_plan),
        )
}

fn evolution_routes() -> Router<AppState> {
    Router::new().route(
        "/:id",
        get(handlers::get_evolution)
            .put(handlers::update_evolution)
            .delete(handlers::delete_evolution),
    )
}

fn family_routes() -> Router<AppState> {
    Router::new().route(
        "/:id",
        put(handlers::update_family_member).delete(handlers::delete_family_member),
    )
}

fn referral_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_referrals))
        .route("/:id", delete(handlers::delete_referral))
        .route("/:id/status", put(handlers::change_referral_status))
}

fn appointment_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_appointments).post(handlers::create_appointment),
        )
        .route(
            "/:id",
            get(handlers::get_appointment)
                .put(handlers::update_appointment)
                .delete(handlers::delete_appointment),
        )
        .route("/:id/status", post(handlers::change_appointment_status))
}

fn saved_filter_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_saved_filters).post(handlers::create_saved_filter),
        )
        .route(
            "/:id",
            put(handlers::update_saved_filter).delete(handlers::delete_saved_filter),
        )
}

fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::get_dashboard))
        .route("/alerts", get(handlers::get_alerts))
}

fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/monthly", get(handlers::monthly_report))
        .route("/cases.csv", get(handlers::export_cases_csv))
}
