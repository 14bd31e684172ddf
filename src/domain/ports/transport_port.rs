//! Network transport port.

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::errors::ImageError;

/// Opens a URL and returns the response body.
///
/// Connectivity failures, timeouts and non-2xx responses surface as
/// [`ImageError::Network`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageTransport: Send + Sync {
    /// Fetches the body behind `url`.
    async fn open(&self, url: &str) -> Result<Bytes, ImageError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::sync::Notify;

    /// Encodes a blank RGBA image as PNG.
    pub fn png_bytes(width: u32, height: u32) -> Bytes {
        let img = image::DynamicImage::new_rgba8(width, height);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png)
            .expect("encode png");
        Bytes::from(out.into_inner())
    }

    struct Route {
        delay: Duration,
        response: Result<Bytes, ImageError>,
        gate: Option<Arc<Notify>>,
    }

    /// Transport answering from a fixed table, with per-URL latency.
    #[derive(Default)]
    pub struct ScriptedTransport {
        routes: Mutex<HashMap<String, Route>>,
        calls: Mutex<HashMap<String, usize>>,
        total: AtomicUsize,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Serves a PNG of the given size after `delay`.
        pub fn serve_png(self, url: &str, width: u32, height: u32, delay: Duration) -> Self {
            self.routes.lock().insert(
                url.to_string(),
                Route {
                    delay,
                    response: Ok(png_bytes(width, height)),
                    gate: None,
                },
            );
            self
        }

        /// Serves raw bytes after `delay`.
        pub fn serve_bytes(self, url: &str, bytes: Bytes, delay: Duration) -> Self {
            self.routes.lock().insert(
                url.to_string(),
                Route {
                    delay,
                    response: Ok(bytes),
                    gate: None,
                },
            );
            self
        }

        /// Fails with the given error after `delay`.
        pub fn fail(self, url: &str, error: ImageError, delay: Duration) -> Self {
            self.routes.lock().insert(
                url.to_string(),
                Route {
                    delay,
                    response: Err(error),
                    gate: None,
                },
            );
            self
        }

        /// Holds responses for an already scripted `url` until `gate` is
        /// notified. The call is counted before it blocks.
        pub fn hold_until(self, url: &str, gate: Arc<Notify>) -> Self {
            if let Some(route) = self.routes.lock().get_mut(url) {
                route.gate = Some(gate);
            }
            self
        }

        /// Resolves once `url` has been opened at least once.
        pub async fn opened(&self, url: &str) {
            while self.calls(url) == 0 {
                tokio::task::yield_now().await;
            }
        }

        pub fn calls(&self, url: &str) -> usize {
            self.calls.lock().get(url).copied().unwrap_or(0)
        }

        pub fn total_calls(&self) -> usize {
            self.total.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageTransport for ScriptedTransport {
        async fn open(&self, url: &str) -> Result<Bytes, ImageError> {
            *self.calls.lock().entry(url.to_string()).or_default() += 1;
            self.total.fetch_add(1, Ordering::SeqCst);

            let (delay, response, gate) = {
                let routes = self.routes.lock();
                match routes.get(url) {
                    Some(route) => (route.delay, route.response.clone(), route.gate.clone()),
                    None => (
                        Duration::ZERO,
                        Err(ImageError::network(format!("HTTP 404 Not Found: {url}"))),
                        None,
                    ),
                }
            };
            if let Some(gate) = gate {
                gate.notified().await;
            }
            tokio::time::sleep(delay).await;
            response
        }
    }
}
