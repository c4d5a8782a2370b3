use std::fmt;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::future::BoxFuture;
use tower::Service;
use tower_layer::Layer;
use tracing::{debug, warn};

/// Requests that can name the operation they start.
pub trait Operation {
    fn operation(&self) -> &'static str;
}

/// Logs every request passing through with its latency and outcome.
#[derive(Debug, Clone)]
pub struct RequestLogLayer {
    target: &'static str,
}

impl RequestLogLayer {
    pub fn new(target: &'static str) -> Self {
        Self { target }
    }
}

impl<S> Layer<S> for RequestLogLayer {
    type Service = RequestLog<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLog {
            inner,
            target: self.target,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestLog<S> {
    inner: S,
    target: &'static str,
}

impl<S, R> Service<R> for RequestLog<S>
where
    S: Service<R>,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: fmt::Display + Send + 'static,
    R: Operation,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: R) -> Self::Future {
        let target = self.target;
        let operation = request.operation();
        let started = Instant::now();
        debug!("{} {} started", target, operation);
        let future = self.inner.call(request);
        Box::pin(async move {
            let result = future.await;
            let elapsed = started.elapsed();
            match &result {
                Ok(_) => debug!("{} {} finished in {:?}", target, operation, elapsed),
                Err(e) => warn!("{} {} failed after {:?}: {}", target, operation, elapsed, e),
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::{service_fn, ServiceBuilder, ServiceExt};

    struct Ping;

    impl Operation for Ping {
        fn operation(&self) -> &'static str {
            "ping"
        }
    }

    #[tokio::test]
    async fn passes_results_through() {
        let ok = ServiceBuilder::new()
            .layer(RequestLogLayer::new("test"))
            .service(service_fn(|_: Ping| async { Ok::<_, String>(7) }));
        assert_eq!(ok.oneshot(Ping).await, Ok(7));

        let failing = ServiceBuilder::new()
            .layer(RequestLogLayer::new("test"))
            .service(service_fn(|_: Ping| async { Err::<u8, _>("down".to_string()) }));
        assert_eq!(failing.oneshot(Ping).await, Err("down".to_string()));
    }
}
