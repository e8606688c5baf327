use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
};

use axum::{
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tower::{Layer, Service};

use crate::storage::{SessionCollection, SessionHandle, SessionStorage};

/// Loads the session before the inner service runs and saves it afterwards
/// when it changed.
///
/// Handlers reach the session through the [`SessionHandle`] extractor. Store
/// failures answer with `500 Internal Server Error`.
pub struct SessionService<C, S> {
    storage: SessionStorage<C>,
    inner: S,
}

impl<C, S> Service<Request> for SessionService<C, S>
where
    S: Service<Request, Error = Infallible> + Clone + Send + 'static,
    S::Response: IntoResponse,
    S::Future: Send,
    C: SessionCollection,
{
    type Response = Response;

    type Error = Infallible;

    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        // The clone may not be ready, keep the one that was polled.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let storage = self.storage.clone();

        Box::pin(async move {
            let session = match storage.load(req.headers()).await {
                Ok(session) => session,
                Err(e) => {
                    tracing::error!("failed to load session: {e}");
                    return Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response());
                }
            };

            let handle = SessionHandle::new(session);
            req.extensions_mut().insert(handle.clone());

            let mut response = inner.call(req).await?.into_response();

            let mut session = handle.lock().await;
            if !session.is_changed() {
                return Ok(response);
            }

            if let Err(e) = storage.save(response.headers_mut(), &mut session).await {
                tracing::error!("failed to save session: {e}");
                return Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response());
            }

            Ok(response)
        })
    }
}

impl<C, S> Layer<S> for SessionStorage<C> {
    type Service = SessionService<C, S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionService {
            storage: self.clone(),
            inner,
        }
    }
}

impl<C, S> Clone for SessionService<C, S>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            inner: self.inner.clone(),
        }
    }
}
