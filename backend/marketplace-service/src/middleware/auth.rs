/// Caller identity middleware.
///
/// Authentication itself is delegated to the external auth provider; the
/// gateway terminates the session and forwards the verified user id in the
/// trusted `X-User-Id` header. This middleware validates the header and adds
/// `UserId` to request extensions for handlers to extract.
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorUnauthorized,
    Error, FromRequest, HttpMessage, HttpRequest,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use uuid::Uuid;

const IDENTITY_HEADER: &str = "X-User-Id";

/// Caller identity extracted from the gateway header
#[derive(Debug, Clone, Copy)]
pub struct UserId(pub Uuid);

pub struct IdentityMiddleware;

impl<S, B> Transform<S, ServiceRequest> for IdentityMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = IdentityMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(IdentityMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct IdentityMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for IdentityMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        Box::pin(async move {
            // Introspection endpoints stay open
            if req.path() == "/health" {
                return service.call(req).await;
            }

            // Clone to an owned String so no header borrow is alive when we
            // touch extensions_mut below
            let header = match req.headers().get(IDENTITY_HEADER) {
                Some(value) => match value.to_str() {
                    Ok(v) => v.to_string(),
                    Err(_) => return Err(ErrorUnauthorized("Invalid X-User-Id header")),
                },
                None => return Err(ErrorUnauthorized("Missing X-User-Id header")),
            };

            let user_id = match Uuid::parse_str(header.trim()) {
                Ok(id) => id,
                Err(_) => return Err(ErrorUnauthorized("X-User-Id is not a valid UUID")),
            };

            req.extensions_mut().insert(UserId(user_id));

            service.call(req).await
        })
    }
}

impl FromRequest for UserId {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        match req.extensions().get::<UserId>().copied() {
            Some(user_id) => ready(Ok(user_id)),
            None => ready(Err(ErrorUnauthorized(
                "User ID missing in request extensions",
            ))),
        }
    }
}
