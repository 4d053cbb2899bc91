use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;

use crate::auth::AuthService;
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{health_check, login, logout, me, refresh, register, verify};

pub fn run(listener: TcpListener, service: AuthService) -> Result<Server, std::io::Error> {
    let codec = service.codec();
    let service = web::Data::new(service);

    let server = HttpServer::new(move || {
        // Malformed JSON bodies get the same error shape as everything else
        let json_config = web::JsonConfig::default().error_handler(|err, _req| {
            tracing::debug!(error = %err, "Rejected request body");
            AppError::from(ValidationError::InvalidFormat("request body")).into()
        });

        App::new()
            .wrap(LoggerMiddleware)
            .app_data(service.clone())
            .app_data(json_config)
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/v1")
                    .service(
                        web::scope("/auth")
                            .route("/login", web::post().to(login))
                            .route("/refresh", web::post().to(refresh))
                            .route("/logout", web::post().to(logout)),
                    )
                    .service(
                        web::scope("/users")
                            .route("", web::post().to(register))
                            .service(
                                web::resource("/me")
                                    .wrap(JwtMiddleware::new(codec.clone()))
                                    .route(web::get().to(me)),
                            )
                            .route("/{id}/verify", web::get().to(verify)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
