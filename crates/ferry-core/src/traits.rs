use std::future::Future;
use std::time::Duration;

use url::Url;

use crate::config::SessionConfig;
use crate::error::AppError;
use crate::job::SelectorSpec;

/// Launches browser sessions.
///
/// One session serves exactly one job and is never shared between workers.
pub trait BrowserDriver: Send + Sync + Clone + 'static {
    type Session: BrowserSession;

    /// Start a browser that downloads into `config.download_dir`.
    ///
    /// Fails with [`AppError::SessionStart`] when no usable browser exists.
    fn open_session(
        &self,
        config: &SessionConfig,
    ) -> impl Future<Output = Result<Self::Session, AppError>> + Send;
}

/// A live browser session.
///
/// [`close`](BrowserSession::close) must be called on every exit path.
/// Implementations should also release the browser when dropped, since a
/// session abandoned by the hard job timeout never reaches `close`.
pub trait BrowserSession: Send {
    type Element: Send + Sync;

    /// Load `url`, failing with [`AppError::NavigationTimeout`] after `timeout`.
    fn navigate(
        &mut self,
        url: &Url,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Find the first element matching `selector`, failing with
    /// [`AppError::ElementNotFound`] if there is none.
    fn locate_element(
        &mut self,
        selector: &SelectorSpec,
    ) -> impl Future<Output = Result<Self::Element, AppError>> + Send;

    /// Fire a native click. Any download it starts is written later, out of band.
    fn click(
        &mut self,
        element: &Self::Element,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn close(self) -> impl Future<Output = Result<(), AppError>> + Send;
}
