pub mod admin;
pub mod auth;
pub mod gateway;
pub mod health;
pub mod public;
pub mod resources;
pub mod seminars;

use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(health::health_check)
            .configure(auth::auth_routes)
            .configure(admin::admin_routes)
            .configure(resources::resources_routes)
            .configure(seminars::seminars_routes)
            .configure(public::public_routes)
    )
    .configure(gateway::gateway_routes);
}
