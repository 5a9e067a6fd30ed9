//! Networking: clocks, HTTP sessions, the session pool and the retrying
//! fetcher built on top of it.

pub mod clock;
pub mod fetcher;
pub mod session_pool;
pub mod transport;

pub use clock::{Clock, SystemClock};
pub use fetcher::{FetchSettings, Fetcher};
pub use session_pool::SessionPool;
pub use transport::ReqwestSessionFactory;
