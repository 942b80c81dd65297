use crate::app::AppContext;
use axum::Router;

/// A group of page or admin routes plugged into the [`App`](crate::App)
///
/// Page handlers live outside this crate; they register here so they sit
/// behind the session and CSRF layers.
///
/// # Example
///
/// ```ignore
/// struct DonationPages;
///
/// impl RouteModule for DonationPages {
///     fn routes(&self) -> Router<AppContext> {
///         Router::new()
///             .route("/donate", get(donation_form).post(submit_donation))
///     }
/// }
/// ```
pub trait RouteModule {
    /// Routes for this module, still missing the `AppContext` state
    fn routes(&self) -> Router<AppContext>;

    /// Path prefix to nest the routes under
    fn prefix(&self) -> Option<&str> {
        None
    }

    fn register(&self, router: Router<AppContext>) -> Router<AppContext> {
        match self.prefix() {
            Some(prefix) => router.nest(prefix, self.routes()),
            None => router.merge(self.routes()),
        }
    }
}
