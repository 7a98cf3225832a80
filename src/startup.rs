use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;

use crate::auth::AuthService;
use crate::configuration::ApplicationSettings;
use crate::middleware::{AccessGate, AdminOnly, AnyUser, RequireRole};
use crate::routes::{
    delete_current_user, delete_user, get_current_user, get_user, health_check, list_users, login,
    logout, refresh, register, update_current_user, update_user,
};

pub fn run(
    listener: TcpListener,
    service: AuthService,
    settings: ApplicationSettings,
) -> Result<Server, std::io::Error> {
    let gate = AccessGate::new(service.access_tokens());
    let service = web::Data::new(service);
    let settings = web::Data::new(settings);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(service.clone())
            .app_data(settings.clone())
            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/auth/register", web::post().to(register))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))
            .service(
                web::resource("/auth/logout")
                    .wrap(gate.clone())
                    .route(web::post().to(logout)),
            )
            // Gated routes; the role guard must run after the gate
            .service(
                web::scope("/users")
                    .wrap(gate.clone())
                    .service(
                        web::resource("/me")
                            .wrap(RequireRole::new(AnyUser))
                            .route(web::get().to(get_current_user))
                            .route(web::put().to(update_current_user))
                            .route(web::delete().to(delete_current_user)),
                    )
                    .service(
                        web::resource("")
                            .wrap(RequireRole::new(AdminOnly))
                            .route(web::get().to(list_users)),
                    )
                    .service(
                        web::resource("/{identity}")
                            .wrap(RequireRole::new(AdminOnly))
                            .route(web::get().to(get_user))
                            .route(web::put().to(update_user))
                            .route(web::delete().to(delete_user)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
