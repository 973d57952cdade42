mod health;
mod metrics;
mod leads;
mod csp_report;
mod page;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use leads::{contact_handler, inquiry_handler};
pub use csp_report::csp_report_handler;
pub use page::page_handler;
