mod reqwest_http_client;
mod system_clock;

pub use reqwest_http_client::ReqwestHttpClient;
pub use system_clock::{ManualClock, SystemClock};
