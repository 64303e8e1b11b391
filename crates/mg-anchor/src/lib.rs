//! Capturing a live text selection as a portable record and finding it again
//! in a later copy of the page.

pub mod ancestry;
pub mod descriptor;
pub mod path;

mod capture;
mod config;
mod point;
mod record;
mod resolve;

pub use capture::CaptureError;
pub use capture::Capturer;
pub use capture::wrap_selection;
pub use config::AnchorConfig;
pub use path::PathResolver;
pub use path::ScoredSelector;
pub use point::NodePoint;
pub use record::SelectionLocator;
pub use record::SelectionRecord;
pub use record::TrimmedPoint;
pub use resolve::Endpoint;
pub use resolve::RelocateError;
pub use resolve::Resolver;
pub use resolve::find_selection;
pub use resolve::highlight;
pub use resolve::highlight_selection;
